//! Built-in executors.

mod block;
mod movement;
mod voxel_type;

pub use block::{DestroyBlockExecutor, PlaceBlockExecutor};
pub use movement::{MoveConfig, MoveToExecutor};
pub use voxel_type::{CreateVoxelTypeExecutor, UpdateVoxelTypeExecutor};
