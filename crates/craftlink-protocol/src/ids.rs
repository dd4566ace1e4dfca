//! Typed ID wrappers.
//!
//! IDs are opaque String wrappers (serde-transparent). The remote planner
//! mints goal, command and plan item ids; only session ids are generated
//! locally.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from any string value.
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// View as string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

typed_id!(
    /// Identifier of one agent session with the planning service.
    SessionId
);
typed_id!(
    /// Identifier of a goal shared by a plan and the commands derived from it.
    GoalId
);
typed_id!(
    /// Identifier of one executable command.
    CommandId
);
typed_id!(
    /// Identifier of one proposed plan item.
    PlanItemId
);
typed_id!(
    /// Identifier of a buildable voxel type.
    VoxelTypeId
);

impl SessionId {
    /// Create a new session ID using UUID v4 (random).
    pub fn new_uuid() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl VoxelTypeId {
    /// The id reserved for "no voxel".
    pub fn air() -> Self {
        Self("0".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new_uuid(), SessionId::new_uuid());
    }

    #[test]
    fn whitespace_id_counts_as_empty() {
        assert!(GoalId::from_string("  ").is_empty());
        assert!(!GoalId::from_string("g1").is_empty());
    }

    #[test]
    fn typed_id_serializes_as_plain_string() {
        let id = CommandId::from_string("c-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"c-7\"");
        let back: CommandId = serde_json::from_str("\"c-7\"").unwrap();
        assert_eq!(back, id);
    }
}
