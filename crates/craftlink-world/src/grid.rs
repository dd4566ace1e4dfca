use std::collections::HashMap;

use craftlink_protocol::{
    CellPos, LinkError, LinkResult, RaycastHit, VoxelInfo, VoxelTypeDescriptor, WorldEditor,
    WorldQuery,
};
use parking_lot::RwLock;
use tracing::trace;

/// Sparse voxel grid. Cells not in the map are empty.
#[derive(Debug, Default)]
pub struct GridWorld {
    cells: RwLock<HashMap<CellPos, VoxelInfo>>,
    /// Cells that refuse edits, for exercising failure paths.
    locked: RwLock<Vec<CellPos>>,
}

impl GridWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, cell: CellPos, voxel: VoxelInfo) {
        self.cells.write().insert(cell, voxel);
    }

    pub fn with_voxel(self, cell: CellPos, id: &str, name: &str) -> Self {
        self.set(cell, VoxelInfo::new(id, name));
        self
    }

    /// A flat `size`×`size` floor of `voxel` at height `y`, centred on the origin.
    pub fn with_floor(self, y: i32, size: i32, voxel: VoxelInfo) -> Self {
        let half = size / 2;
        {
            let mut cells = self.cells.write();
            for x in -half..=half {
                for z in -half..=half {
                    cells.insert(CellPos::new(x, y, z), voxel.clone());
                }
            }
        }
        self
    }

    pub fn lock_cell(&self, cell: CellPos) {
        self.locked.write().push(cell);
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.read().is_empty()
    }

    fn ensure_editable(&self, cell: CellPos) -> LinkResult<()> {
        if self.locked.read().contains(&cell) {
            return Err(LinkError::World(format!(
                "cell ({}, {}, {}) is protected",
                cell.x, cell.y, cell.z
            )));
        }
        Ok(())
    }
}

impl WorldQuery for GridWorld {
    fn raycast(&self, origin: CellPos, direction: CellPos, max_cells: u32) -> Option<RaycastHit> {
        let cells = self.cells.read();
        (0..max_cells as i32).find_map(|step| {
            let cell = origin.offset(direction, step);
            cells.get(&cell).map(|voxel| RaycastHit {
                cell,
                voxel: voxel.clone(),
            })
        })
    }

    fn occupied_cells_near(&self, center: CellPos, radius: u32) -> Vec<(CellPos, VoxelInfo)> {
        self.cells
            .read()
            .iter()
            .filter(|(cell, _)| cell.taxicab_distance(center) <= radius)
            .map(|(cell, voxel)| (*cell, voxel.clone()))
            .collect()
    }
}

impl WorldEditor for GridWorld {
    fn voxel_at(&self, cell: CellPos) -> Option<VoxelInfo> {
        self.cells.read().get(&cell).cloned()
    }

    fn place_voxel(&self, cell: CellPos, voxel: &VoxelTypeDescriptor) -> LinkResult<()> {
        self.ensure_editable(cell)?;
        trace!(?cell, voxel = %voxel.name, "place");
        self.cells.write().insert(cell, VoxelInfo::from(voxel));
        Ok(())
    }

    fn remove_voxel(&self, cell: CellPos) -> LinkResult<Option<VoxelInfo>> {
        self.ensure_editable(cell)?;
        trace!(?cell, "remove");
        Ok(self.cells.write().remove(&cell))
    }
}
