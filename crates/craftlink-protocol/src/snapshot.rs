//! Point-in-time game state attached to outbound batches.

use crate::geometry::{CellPos, Vec3};
use crate::ids::{CommandId, GoalId, PlanItemId, VoxelTypeId};
use crate::voxel::VoxelTypeDescriptor;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name reported for a scan direction with nothing in range.
pub const EMPTY_PROBE_NAME: &str = "empty";
/// Id reported for a scan direction with nothing in range.
pub const EMPTY_PROBE_ID: &str = "0";

/// Nearest occupied cell along one axis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectionProbe {
    pub name: String,
    pub id: VoxelTypeId,
    pub distance: u32,
}

impl DirectionProbe {
    pub fn empty(max_distance: u32) -> Self {
        Self {
            name: EMPTY_PROBE_NAME.to_owned(),
            id: VoxelTypeId::from_string(EMPTY_PROBE_ID),
            distance: max_distance,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name == EMPTY_PROBE_NAME && self.id.as_str() == EMPTY_PROBE_ID
    }
}

/// Direction name (`up`, `down`, `north`, ...) to probe result, in scan order.
pub type SixDirectionScan = IndexMap<String, DirectionProbe>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearbyVoxel {
    pub id: VoxelTypeId,
    pub name: String,
    pub position: CellPos,
    pub distance: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPlanEntry {
    pub id: PlanItemId,
    pub goal_id: GoalId,
    pub goal_label: String,
    pub action_type: String,
    pub description: String,
    #[serde(default)]
    pub depends_on: Vec<PlanItemId>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandPhase {
    #[default]
    Pending,
    Executing,
    Completed,
    Failed,
    Interrupted,
}

impl CommandPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Interrupted)
    }
}

impl fmt::Display for CommandPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCommandEntry {
    pub id: CommandId,
    pub goal_id: GoalId,
    pub goal_label: String,
    #[serde(rename = "type")]
    pub command_type: String,
    /// Opaque JSON text, forwarded verbatim.
    pub params: String,
    pub phase: CommandPhase,
}

/// Immutable copy of everything the agent currently knows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameStateSnapshot {
    pub timestamp: String,
    pub agent_position: Vec3,
    pub operator_relative_position: Option<Vec3>,
    pub six_direction_scan: SixDirectionScan,
    pub nearby_voxels: Vec<NearbyVoxel>,
    pub pending_plans: Vec<PendingPlanEntry>,
    pub last_commands: Vec<LastCommandEntry>,
    pub voxel_type_catalog: Vec<VoxelTypeDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_probe_wire_shape() {
        let probe = DirectionProbe::empty(10);
        assert_eq!(
            serde_json::to_value(&probe).unwrap(),
            json!({"name": "empty", "id": "0", "distance": 10})
        );
        assert!(probe.is_empty());
    }

    #[test]
    fn last_command_serializes_type_key() {
        let entry = LastCommandEntry {
            id: CommandId::from_string("c1"),
            goal_id: GoalId::from_string("g1"),
            goal_label: "tower".into(),
            command_type: "place_block".into(),
            params: "{\"count\":3}".into(),
            phase: CommandPhase::Executing,
        };
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["type"], "place_block");
        assert_eq!(value["phase"], "executing");
    }
}
