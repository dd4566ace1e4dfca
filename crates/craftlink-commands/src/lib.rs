//! Command dispatch and the built-in executors.
//!
//! Every command type maps to exactly one [`CommandExecutor`]. An executor
//! reports through a consuming [`Completion`] handle, so each dispatched
//! command yields exactly one [`CommandOutcome`], whether it finishes on the
//! spot or several ticks later.

mod completion;
mod dispatcher;
pub mod executors;
mod params;

pub use completion::{
    CommandFailure, CommandOutcome, Completion, OutcomeReceiver, OutcomeSender,
};
pub use dispatcher::{CommandDispatcher, DispatchReport, DispatchStatus};
pub use params::{MAX_EXPANSION, MAX_START_OFFSET, TargetParams, parse_params};

use std::fmt;
use std::time::Duration;

use craftlink_protocol::CommandId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandType {
    PlaceBlock,
    DestroyBlock,
    MoveTo,
    CreateVoxelType,
    UpdateVoxelType,
}

impl CommandType {
    pub const ALL: [CommandType; 5] = [
        CommandType::PlaceBlock,
        CommandType::DestroyBlock,
        CommandType::MoveTo,
        CommandType::CreateVoxelType,
        CommandType::UpdateVoxelType,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PlaceBlock => "place_block",
            Self::DestroyBlock => "destroy_block",
            Self::MoveTo => "move_to",
            Self::CreateVoxelType => "create_voxel_type",
            Self::UpdateVoxelType => "update_voxel_type",
        }
    }

    /// Case-insensitive match on the wire name.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|ty| ty.as_str().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for CommandType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Performs one command type's side effects.
///
/// `interrupt` only requests cancellation; the in-flight operation reports
/// [`CommandFailure::Interrupted`] through its own completion on a later
/// `tick`. An executor that is not running anything ignores it.
pub trait CommandExecutor: Send {
    fn command_type(&self) -> CommandType;

    fn execute(&mut self, command_id: &CommandId, params: &str, completion: Completion);

    fn interrupt(&mut self) {}

    fn can_interrupt(&self) -> bool {
        false
    }

    fn is_busy(&self) -> bool {
        false
    }

    /// Advance a long-running operation by `dt`.
    fn tick(&mut self, _dt: Duration) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_types_parse_wire_names() {
        assert_eq!(CommandType::parse("Move_To"), Some(CommandType::MoveTo));
        assert_eq!(CommandType::parse("fly"), None);
        for ty in CommandType::ALL {
            assert_eq!(CommandType::parse(ty.as_str()), Some(ty));
        }
    }
}
