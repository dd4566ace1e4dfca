//! Collaborator ports.
//!
//! These traits are the only boundary between the orchestration crates and
//! the engine-specific world: the HTTP transport, grid queries and edits, the
//! actor's body, photo capture, the voxel type registry, and the operator UI.
//!
//! Object-safety note:
//! - `Transport` uses `async-trait` for async dyn-dispatch.
//! - Everything else is synchronous and called from the control loop.

use crate::error::LinkResult;
use crate::event::ImageRef;
use crate::geometry::{ActorPose, CellPos, Vec3};
use crate::ids::VoxelTypeId;
use crate::response::{Endpoint, PlanBatch};
use crate::voxel::{VoxelInfo, VoxelTypeDescriptor, VoxelTypeDraft, VoxelTypePatch};
use async_trait::async_trait;

/// Opaque request/response channel to the planning service.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` (JSON) to `endpoint`, returning the raw reply body.
    async fn send(&self, endpoint: Endpoint, body: String) -> LinkResult<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaycastHit {
    pub cell: CellPos,
    pub voxel: VoxelInfo,
}

/// Read-only queries against the authoritative world grid.
pub trait WorldQuery: Send + Sync {
    /// Walk at most `max_cells` cells from `origin` (inclusive) along the unit
    /// step `direction`, returning the first occupied cell.
    fn raycast(&self, origin: CellPos, direction: CellPos, max_cells: u32) -> Option<RaycastHit>;

    /// Occupied cells within taxicab `radius` of `center`.
    fn occupied_cells_near(&self, center: CellPos, radius: u32) -> Vec<(CellPos, VoxelInfo)>;
}

/// Cell-level mutation of the world grid.
pub trait WorldEditor: Send + Sync {
    fn voxel_at(&self, cell: CellPos) -> Option<VoxelInfo>;
    fn place_voxel(&self, cell: CellPos, voxel: &VoxelTypeDescriptor) -> LinkResult<()>;
    /// Clear `cell`, returning what was there.
    fn remove_voxel(&self, cell: CellPos) -> LinkResult<Option<VoxelInfo>>;
}

/// The agent's body in the world.
pub trait AgentBody: Send + Sync {
    fn pose(&self) -> ActorPose;
    fn set_position(&self, position: Vec3);
}

/// Invoked exactly once with the captured images (possibly none).
pub type CaptureCallback = Box<dyn FnOnce(Vec<ImageRef>) + Send>;

/// Render-and-readback of front/back/left/right views of the agent.
pub trait PhotoCapture: Send + Sync {
    fn capture_four_directions(&self, on_captured: CaptureCallback);
}

pub trait VoxelTypeRegistry: Send + Sync {
    fn lookup(&self, id: &VoxelTypeId) -> Option<VoxelTypeDescriptor>;
    fn lookup_by_name(&self, name: &str) -> Option<VoxelTypeDescriptor>;
    fn list_all(&self) -> Vec<VoxelTypeDescriptor>;
    fn create(&self, draft: VoxelTypeDraft) -> LinkResult<VoxelTypeDescriptor>;
    fn update(&self, patch: VoxelTypePatch) -> LinkResult<VoxelTypeDescriptor>;
}

/// Observer-facing UI: the approval workflow and the chat log.
pub trait PlanObserver: Send + Sync {
    /// A non-empty plan is awaiting approval.
    fn show_plan(&self, plan: &PlanBatch);
    /// The planner's `talk_to_player` text.
    fn show_message(&self, message: &str);
    /// A reply that was neither a plan nor a command batch.
    fn show_text_reply(&self, text: &str);
}
