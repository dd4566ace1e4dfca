//! Headless world for running a craftlink session without a game engine.
//!
//! - [`GridWorld`]: sparse voxel grid (WorldQuery + WorldEditor)
//! - [`InMemoryVoxelRegistry`]: voxel type catalog
//! - [`SimulatedBody`]: agent pose that can be frozen to simulate blockage
//! - [`StaticPhotoCapture`]: immediate or deferred canned captures
//! - [`RecordingObserver`]: PlanObserver that keeps what it was shown

mod body;
mod capture;
mod grid;
mod observer;
mod registry;

pub use body::SimulatedBody;
pub use capture::StaticPhotoCapture;
pub use grid::GridWorld;
pub use observer::{ObservedItem, RecordingObserver};
pub use registry::InMemoryVoxelRegistry;
