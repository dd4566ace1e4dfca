use craftlink_protocol::{
    LinkError, LinkResult, VoxelTypeDescriptor, VoxelTypeDraft, VoxelTypeId, VoxelTypePatch,
    VoxelTypeRegistry,
};
use indexmap::IndexMap;
use parking_lot::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct Catalog {
    types: IndexMap<VoxelTypeId, VoxelTypeDescriptor>,
    next_id: u32,
}

/// Voxel type catalog kept in insertion order. Ids are assigned from a
/// counter starting at 1 (`"0"` is reserved for air).
#[derive(Debug, Default)]
pub struct InMemoryVoxelRegistry {
    catalog: RwLock<Catalog>,
}

impl InMemoryVoxelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// stone, dirt, grass, wood, glass.
    pub fn with_builtin_types() -> Self {
        let registry = Self::new();
        for (name, description) in [
            ("stone", "solid grey rock"),
            ("dirt", "loose brown soil"),
            ("grass", "dirt topped with grass"),
            ("wood", "oak planks"),
            ("glass", "transparent pane"),
        ] {
            let texture = format!("{name}.png");
            // Names are unique here, so creation cannot fail.
            let _ = registry.create(VoxelTypeDraft {
                id: None,
                name: name.to_owned(),
                description: description.to_owned(),
                face_textures: std::array::from_fn(|_| texture.clone()),
            });
        }
        registry
    }

    pub fn remove(&self, id: &VoxelTypeId) -> Option<VoxelTypeDescriptor> {
        self.catalog.write().types.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.catalog.read().types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.read().types.is_empty()
    }
}

impl VoxelTypeRegistry for InMemoryVoxelRegistry {
    fn lookup(&self, id: &VoxelTypeId) -> Option<VoxelTypeDescriptor> {
        self.catalog.read().types.get(id).cloned()
    }

    fn lookup_by_name(&self, name: &str) -> Option<VoxelTypeDescriptor> {
        self.catalog
            .read()
            .types
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name.trim()))
            .cloned()
    }

    fn list_all(&self) -> Vec<VoxelTypeDescriptor> {
        self.catalog.read().types.values().cloned().collect()
    }

    fn create(&self, draft: VoxelTypeDraft) -> LinkResult<VoxelTypeDescriptor> {
        let name = draft.name.trim();
        if name.is_empty() {
            return Err(LinkError::Registry("voxel type name is empty".to_owned()));
        }
        let mut catalog = self.catalog.write();
        if catalog
            .types
            .values()
            .any(|t| t.name.eq_ignore_ascii_case(name))
        {
            return Err(LinkError::Registry(format!(
                "voxel type already exists: {name}"
            )));
        }
        let id = match draft.id.filter(|id| !id.is_empty()) {
            Some(id) if catalog.types.contains_key(&id) => {
                return Err(LinkError::Registry(format!("voxel type id in use: {id}")));
            }
            Some(id) => id,
            None => loop {
                catalog.next_id += 1;
                let candidate = VoxelTypeId::from_string(catalog.next_id.to_string());
                if !catalog.types.contains_key(&candidate) {
                    break candidate;
                }
            },
        };
        let descriptor = VoxelTypeDescriptor {
            id: id.clone(),
            name: name.to_owned(),
            description: draft.description,
            face_textures: draft.face_textures,
        };
        catalog.types.insert(id, descriptor.clone());
        debug!(id = %descriptor.id, name = %descriptor.name, "voxel type created");
        Ok(descriptor)
    }

    fn update(&self, patch: VoxelTypePatch) -> LinkResult<VoxelTypeDescriptor> {
        let mut catalog = self.catalog.write();
        if let Some(new_name) = patch.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
            && catalog
                .types
                .values()
                .any(|t| t.id != patch.id && t.name.eq_ignore_ascii_case(new_name))
        {
            return Err(LinkError::Registry(format!(
                "voxel type already exists: {new_name}"
            )));
        }
        let descriptor = catalog
            .types
            .get_mut(&patch.id)
            .ok_or_else(|| LinkError::NotFound(format!("voxel type {}", patch.id)))?;
        patch.apply_to(descriptor);
        debug!(id = %descriptor.id, name = %descriptor.name, "voxel type updated");
        Ok(descriptor.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_types_get_sequential_ids() {
        let registry = InMemoryVoxelRegistry::with_builtin_types();
        assert_eq!(registry.len(), 5);
        let stone = registry.lookup_by_name("Stone").unwrap();
        assert_eq!(stone.id.as_str(), "1");
        assert_eq!(registry.list_all()[4].name, "glass");
    }

    #[test]
    fn duplicate_names_rejected() {
        let registry = InMemoryVoxelRegistry::with_builtin_types();
        let err = registry
            .create(VoxelTypeDraft {
                name: "dirt".into(),
                ..Default::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn update_unknown_id_is_not_found() {
        let registry = InMemoryVoxelRegistry::new();
        let err = registry
            .update(VoxelTypePatch {
                id: VoxelTypeId::from_string("42"),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, LinkError::NotFound(_)));
    }
}
