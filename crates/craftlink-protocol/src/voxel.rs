//! Voxel type descriptors and the requests that create or amend them.

use crate::ids::VoxelTypeId;
use serde::{Deserialize, Serialize};

/// Number of faces on a voxel (top, bottom, north, south, east, west).
pub const FACE_COUNT: usize = 6;

/// Description of a buildable block type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoxelTypeDescriptor {
    pub id: VoxelTypeId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub face_textures: [String; FACE_COUNT],
}

/// Id and name of the voxel occupying a cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelInfo {
    pub id: VoxelTypeId,
    pub name: String,
}

impl VoxelInfo {
    pub fn new(id: impl Into<VoxelTypeId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl From<&VoxelTypeDescriptor> for VoxelInfo {
    fn from(descriptor: &VoxelTypeDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.name.clone(),
        }
    }
}

/// Request to register a new voxel type. The registry assigns an id when
/// none is supplied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelTypeDraft {
    #[serde(default)]
    pub id: Option<VoxelTypeId>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub face_textures: [String; FACE_COUNT],
}

/// Partial update of an existing voxel type. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoxelTypePatch {
    pub id: VoxelTypeId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub face_textures: [Option<String>; FACE_COUNT],
}

impl VoxelTypePatch {
    /// Apply the supplied fields to `descriptor`; blank strings are ignored.
    pub fn apply_to(&self, descriptor: &mut VoxelTypeDescriptor) {
        if let Some(name) = non_blank(&self.name) {
            descriptor.name = name.to_owned();
        }
        if let Some(description) = non_blank(&self.description) {
            descriptor.description = description.to_owned();
        }
        for (slot, texture) in descriptor.face_textures.iter_mut().zip(&self.face_textures) {
            if let Some(texture) = non_blank(texture) {
                *slot = texture.to_owned();
            }
        }
    }

    pub fn is_noop(&self) -> bool {
        non_blank(&self.name).is_none()
            && non_blank(&self.description).is_none()
            && self.face_textures.iter().all(|t| non_blank(t).is_none())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone() -> VoxelTypeDescriptor {
        VoxelTypeDescriptor {
            id: VoxelTypeId::from_string("1"),
            name: "stone".into(),
            description: "grey rock".into(),
            face_textures: std::array::from_fn(|_| "stone.png".to_owned()),
        }
    }

    #[test]
    fn patch_leaves_blank_and_absent_fields_alone() {
        let mut descriptor = stone();
        let mut patch = VoxelTypePatch {
            id: descriptor.id.clone(),
            name: Some(String::new()),
            description: Some("polished".into()),
            ..Default::default()
        };
        patch.face_textures[0] = Some("stone_top.png".into());
        patch.face_textures[1] = Some("   ".into());

        patch.apply_to(&mut descriptor);

        assert_eq!(descriptor.name, "stone");
        assert_eq!(descriptor.description, "polished");
        assert_eq!(descriptor.face_textures[0], "stone_top.png");
        assert_eq!(descriptor.face_textures[1], "stone.png");
    }

    #[test]
    fn empty_patch_is_noop() {
        let patch = VoxelTypePatch {
            id: VoxelTypeId::from_string("1"),
            name: Some(" ".into()),
            ..Default::default()
        };
        assert!(patch.is_noop());
    }
}
