//! Replies from the planning service and the plan-approval request.
//!
//! Replies carry no discriminant tag; [`PlanBatch`] and [`CommandBatch`] are
//! told apart by shape (see `craftlink-router`).

use crate::ids::{CommandId, GoalId, PlanItemId, SessionId};
use crate::snapshot::{CommandPhase, PendingPlanEntry};
use serde::{Deserialize, Serialize};

/// Remote endpoints the orchestrator talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Events,
    PlanPermission,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::Events => "/events",
            Self::PlanPermission => "/plan-permission",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    pub id: PlanItemId,
    pub action_type: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<PlanItemId>,
}

/// A proposed sequence of action items awaiting operator approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanBatch {
    pub goal_id: GoalId,
    #[serde(default)]
    pub goal_label: String,
    pub session_id: SessionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub talk_to_player: Option<String>,
    pub plan: Vec<PlanItem>,
}

impl PlanBatch {
    pub fn pending_entries(&self) -> Vec<PendingPlanEntry> {
        self.plan
            .iter()
            .map(|item| PendingPlanEntry {
                id: item.id.clone(),
                goal_id: self.goal_id.clone(),
                goal_label: self.goal_label.clone(),
                action_type: item.action_type.clone(),
                description: item.description.clone(),
                depends_on: item.depends_on.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub id: CommandId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<GoalId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_label: Option<String>,
    #[serde(rename = "type")]
    pub command_type: String,
    /// Opaque JSON text. Accepts either an embedded JSON value or a string
    /// holding JSON on the wire.
    #[serde(default = "empty_params", with = "params_text")]
    pub params: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<CommandPhase>,
}

fn empty_params() -> String {
    "{}".to_owned()
}

/// Concrete commands to execute immediately under one goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandBatch {
    pub goal_id: GoalId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_label: Option<String>,
    pub session_id: SessionId,
    pub commands: Vec<CommandSpec>,
}

/// Body of `POST /plan-permission`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanApproval {
    pub goal_id: GoalId,
    pub goal_label: String,
    pub session_id: SessionId,
    pub plan: Vec<PlanItem>,
}

mod params_text {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    pub fn serialize<S: Serializer>(params: &str, serializer: S) -> Result<S::Ok, S::Error> {
        match serde_json::from_str::<Value>(params) {
            Ok(value) => value.serialize(serializer),
            Err(_) => serializer.serialize_str(params),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(text) => text,
            Value::Null => "{}".to_owned(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn params_accept_object_or_string() {
        let embedded: CommandSpec = serde_json::from_value(json!({
            "id": "c1", "type": "move_to", "params": {"count": 2}
        }))
        .unwrap();
        assert_eq!(embedded.params, "{\"count\":2}");

        let stringly: CommandSpec = serde_json::from_value(json!({
            "id": "c2", "type": "move_to", "params": "{\"count\":2}"
        }))
        .unwrap();
        assert_eq!(stringly.params, embedded.params);

        let missing: CommandSpec =
            serde_json::from_value(json!({"id": "c3", "type": "move_to"})).unwrap();
        assert_eq!(missing.params, "{}");
    }

    #[test]
    fn params_serialize_back_as_json() {
        let spec = CommandSpec {
            id: CommandId::from_string("c1"),
            goal_id: None,
            goal_label: None,
            command_type: "place_block".into(),
            params: "{\"count\":3}".into(),
            phase: None,
        };
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["params"]["count"], 3);
        assert!(value.get("phase").is_none());
    }

    #[test]
    fn plan_entries_inherit_goal() {
        let plan: PlanBatch = serde_json::from_value(json!({
            "goal_id": "g1",
            "goal_label": "build a hut",
            "session_id": "s1",
            "plan": [{"id": "p1", "action_type": "place_block", "description": "floor"}]
        }))
        .unwrap();
        let entries = plan.pending_entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].goal_label, "build a hut");
        assert!(entries[0].depends_on.is_empty());
    }
}
