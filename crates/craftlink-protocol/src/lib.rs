//! # craftlink-protocol, shared wire model and collaborator ports
//!
//! This crate defines the data shapes exchanged with the remote planning
//! service, the point-in-time game state snapshot attached to every batch, and
//! the trait interfaces through which the orchestration crates reach the world,
//! the transport, and the UI.
//!
//! It carries no runtime (no tokio, no HTTP client) so it can be used as a pure
//! contract crate.
//!
//! ## Module Overview
//!
//! - [`ids`]: Typed ID wrappers (SessionId, GoalId, CommandId, ...)
//! - [`geometry`]: Vec3, CellPos, actor pose and direction vocabularies
//! - [`voxel`]: VoxelTypeDescriptor plus create/update requests
//! - [`event`]: Event, EventBatch, payload variants, batch validation
//! - [`snapshot`]: GameStateSnapshot and its bounded history entries
//! - [`response`]: Plan Batch / Command Batch replies and plan approvals
//! - [`ports`]: Collaborator boundary (transport, world, capture, registry, UI)
//! - [`error`]: LinkError, LinkResult

pub mod error;
pub mod event;
pub mod geometry;
pub mod ids;
pub mod ports;
pub mod response;
pub mod snapshot;
pub mod voxel;

pub use error::{BatchValidationError, LinkError, LinkResult};
pub use event::{
    BuildAction, BuildActionKind, BuildPayload, ContinuePlanPayload, Event, EventBatch,
    EventPayload, EventType, ImageRef, MAX_EVENT_IMAGES, PerceptionPayload, SpeechPayload,
    VoxelTypeChange, VoxelTypeChangedPayload, VoxelTypeCreatedPayload,
};
pub use geometry::{ActorPose, CellPos, LocalDirection, ScanDirection, Vec3};
pub use ids::{CommandId, GoalId, PlanItemId, SessionId, VoxelTypeId};
pub use ports::{
    AgentBody, CaptureCallback, PhotoCapture, PlanObserver, RaycastHit, Transport,
    VoxelTypeRegistry, WorldEditor, WorldQuery,
};
pub use response::{CommandBatch, CommandSpec, Endpoint, PlanApproval, PlanBatch, PlanItem};
pub use snapshot::{
    CommandPhase, DirectionProbe, EMPTY_PROBE_ID, EMPTY_PROBE_NAME, GameStateSnapshot,
    LastCommandEntry, NearbyVoxel, PendingPlanEntry, SixDirectionScan,
};
pub use voxel::{FACE_COUNT, VoxelInfo, VoxelTypeDescriptor, VoxelTypeDraft, VoxelTypePatch};
