use std::sync::Arc;

use craftlink_events::EventBus;
use craftlink_protocol::{
    CommandId, FACE_COUNT, LinkError, VoxelTypeChange, VoxelTypeChangedPayload,
    VoxelTypeCreatedPayload, VoxelTypeDraft, VoxelTypeId, VoxelTypePatch, VoxelTypeRegistry,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::{CommandExecutor, CommandFailure, CommandType, Completion, parse_params};

#[derive(Debug, Deserialize)]
struct CreateParams {
    #[serde(default)]
    id: Option<VoxelTypeId>,
    name: String,
    #[serde(default)]
    description: String,
    /// Per-face textures; missing trailing faces repeat the last one given.
    #[serde(default)]
    face_textures: Vec<String>,
    /// One texture for every face.
    #[serde(default)]
    texture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    #[serde(default)]
    id: Option<VoxelTypeId>,
    /// Used when `id` is absent or blank.
    #[serde(default)]
    voxel_id: Option<VoxelTypeId>,
    /// Locates the type when no id is given.
    #[serde(default)]
    voxel_name: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    /// Blank entries leave that face unchanged.
    #[serde(default)]
    face_textures: Vec<String>,
    #[serde(default)]
    texture: Option<String>,
}

fn registry_failure(error: LinkError) -> CommandFailure {
    match error {
        LinkError::NotFound(what) => CommandFailure::UnknownVoxelType(what),
        other => CommandFailure::Registry(other.to_string()),
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

pub struct CreateVoxelTypeExecutor {
    registry: Arc<dyn VoxelTypeRegistry>,
    bus: EventBus,
}

impl CreateVoxelTypeExecutor {
    pub fn new(registry: Arc<dyn VoxelTypeRegistry>, bus: EventBus) -> Self {
        Self { registry, bus }
    }

    fn run(&self, params: &str) -> Result<String, CommandFailure> {
        let params: CreateParams = parse_params(params)?;
        let shared = non_blank(params.texture.as_deref()).unwrap_or_default();
        let mut face_textures: [String; FACE_COUNT] = std::array::from_fn(|_| shared.to_owned());
        if let Some(last) = params.face_textures.last() {
            for (index, slot) in face_textures.iter_mut().enumerate() {
                *slot = params.face_textures.get(index).unwrap_or(last).clone();
            }
        }

        let voxel_type = self
            .registry
            .create(VoxelTypeDraft {
                id: params.id,
                name: params.name,
                description: params.description,
                face_textures,
            })
            .map_err(registry_failure)?;
        info!(id = %voxel_type.id, name = %voxel_type.name, "voxel type created");
        let summary = format!("created {} ({})", voxel_type.name, voxel_type.id);
        self.bus.publish(&VoxelTypeCreatedPayload { voxel_type });
        Ok(summary)
    }
}

impl CommandExecutor for CreateVoxelTypeExecutor {
    fn command_type(&self) -> CommandType {
        CommandType::CreateVoxelType
    }

    #[instrument(skip(self, params, completion), fields(command = "create_voxel_type"))]
    fn execute(&mut self, command_id: &CommandId, params: &str, completion: Completion) {
        match self.run(params) {
            Ok(summary) => completion.complete(summary),
            Err(failure) => completion.fail(failure),
        }
    }
}

pub struct UpdateVoxelTypeExecutor {
    registry: Arc<dyn VoxelTypeRegistry>,
    bus: EventBus,
}

impl UpdateVoxelTypeExecutor {
    pub fn new(registry: Arc<dyn VoxelTypeRegistry>, bus: EventBus) -> Self {
        Self { registry, bus }
    }

    /// Find the target type by `id`, then `voxel_id`, then `voxel_name`.
    fn locate(&self, params: &UpdateParams) -> Result<VoxelTypeId, CommandFailure> {
        let by_id = [params.id.as_ref(), params.voxel_id.as_ref()]
            .into_iter()
            .flatten()
            .find(|id| !id.is_empty());
        if let Some(id) = by_id {
            return self
                .registry
                .lookup(id)
                .map(|voxel| voxel.id)
                .ok_or_else(|| CommandFailure::UnknownVoxelType(id.to_string()));
        }
        let name = non_blank(params.voxel_name.as_deref()).ok_or_else(|| {
            CommandFailure::MalformedParams("id or voxel_name is required".to_owned())
        })?;
        self.registry
            .lookup_by_name(name)
            .map(|voxel| voxel.id)
            .ok_or_else(|| CommandFailure::UnknownVoxelType(name.to_owned()))
    }

    fn run(&self, params: &str) -> Result<String, CommandFailure> {
        let params: UpdateParams = parse_params(params)?;
        let id = self.locate(&params)?;

        let shared = non_blank(params.texture.as_deref()).map(str::to_owned);
        let face_textures: [Option<String>; FACE_COUNT] = std::array::from_fn(|index| {
            non_blank(params.face_textures.get(index).map(String::as_str))
                .map(str::to_owned)
                .or_else(|| shared.clone())
        });
        let patch = VoxelTypePatch {
            id,
            name: params.name,
            description: params.description,
            face_textures,
        };
        if patch.is_noop() {
            return Ok(format!("nothing to change on {}", patch.id));
        }

        let voxel_type = self.registry.update(patch).map_err(registry_failure)?;
        info!(id = %voxel_type.id, name = %voxel_type.name, "voxel type updated");
        let summary = format!("updated {} ({})", voxel_type.name, voxel_type.id);
        self.bus.publish(&VoxelTypeChangedPayload {
            change: VoxelTypeChange::Updated,
            voxel_type,
        });
        Ok(summary)
    }
}

impl CommandExecutor for UpdateVoxelTypeExecutor {
    fn command_type(&self) -> CommandType {
        CommandType::UpdateVoxelType
    }

    #[instrument(skip(self, params, completion), fields(command = "update_voxel_type"))]
    fn execute(&mut self, command_id: &CommandId, params: &str, completion: Completion) {
        match self.run(params) {
            Ok(summary) => completion.complete(summary),
            Err(failure) => completion.fail(failure),
        }
    }
}
