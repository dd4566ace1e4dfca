use std::sync::Arc;

use craftlink_events::BuildEventAggregator;
use craftlink_protocol::{
    AgentBody, BuildAction, BuildActionKind, CellPos, CommandId, VoxelInfo, VoxelTypeDescriptor,
    VoxelTypeId, VoxelTypeRegistry, WorldEditor,
};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use crate::{CommandExecutor, CommandFailure, CommandType, Completion, TargetParams, parse_params};

#[derive(Debug, Deserialize)]
struct PlaceParams {
    #[serde(flatten)]
    target: TargetParams,
    #[serde(default)]
    voxel_id: Option<VoxelTypeId>,
    #[serde(default)]
    voxel_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DestroyParams {
    #[serde(flatten)]
    target: TargetParams,
    #[serde(default)]
    voxel_names: Vec<String>,
    #[serde(default)]
    voxel_ids: Vec<VoxelTypeId>,
}

impl DestroyParams {
    /// Every supplied filter must accept the voxel.
    fn accepts(&self, voxel: &VoxelInfo) -> bool {
        let name_ok = self.voxel_names.is_empty()
            || self
                .voxel_names
                .iter()
                .any(|name| name.trim().eq_ignore_ascii_case(&voxel.name));
        let id_ok = self.voxel_ids.is_empty() || self.voxel_ids.contains(&voxel.id);
        name_ok && id_ok
    }
}

/// Shared collaborators of the two block executors.
#[derive(Clone)]
struct BlockContext {
    world: Arc<dyn WorldEditor>,
    body: Arc<dyn AgentBody>,
    aggregator: Option<BuildEventAggregator>,
}

impl BlockContext {
    fn record(&self, action: BuildActionKind, position: CellPos, voxel: &VoxelInfo) {
        if let Some(aggregator) = &self.aggregator {
            aggregator.record(BuildAction {
                action,
                position,
                voxel_id: voxel.id.clone(),
                voxel_name: voxel.name.clone(),
            });
        }
    }
}

pub struct PlaceBlockExecutor {
    context: BlockContext,
    registry: Arc<dyn VoxelTypeRegistry>,
}

impl PlaceBlockExecutor {
    pub fn new(
        world: Arc<dyn WorldEditor>,
        body: Arc<dyn AgentBody>,
        registry: Arc<dyn VoxelTypeRegistry>,
        aggregator: Option<BuildEventAggregator>,
    ) -> Self {
        Self {
            context: BlockContext {
                world,
                body,
                aggregator,
            },
            registry,
        }
    }

    fn resolve_voxel(&self, params: &PlaceParams) -> Result<VoxelTypeDescriptor, CommandFailure> {
        let by_id = params
            .voxel_id
            .as_ref()
            .filter(|id| !id.is_empty())
            .map(|id| (id.to_string(), self.registry.lookup(id)));
        let by_name = params
            .voxel_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| (name.to_owned(), self.registry.lookup_by_name(name)));

        match (by_id, by_name) {
            (Some((_, Some(voxel))), _) | (None, Some((_, Some(voxel)))) => Ok(voxel),
            (Some((_, None)), Some((_, Some(voxel)))) => Ok(voxel),
            (Some((key, None)), _) | (None, Some((key, None))) => {
                Err(CommandFailure::UnknownVoxelType(key))
            }
            (None, None) => Err(CommandFailure::MalformedParams(
                "voxel_id or voxel_name is required".to_owned(),
            )),
        }
    }

    fn run(&self, params: &str) -> Result<String, CommandFailure> {
        let params: PlaceParams = parse_params(params)?;
        let voxel = self.resolve_voxel(&params)?;
        let cells = params.target.resolve(&self.context.body.pose())?;
        let info = VoxelInfo::from(&voxel);

        let mut placed = 0usize;
        let mut last_error = None;
        for cell in &cells {
            if self.context.world.voxel_at(*cell).is_some() {
                debug!(?cell, "cell occupied; skipped");
                continue;
            }
            match self.context.world.place_voxel(*cell, &voxel) {
                Ok(()) => {
                    placed += 1;
                    self.context.record(BuildActionKind::Place, *cell, &info);
                }
                Err(error) => {
                    warn!(?cell, %error, "place failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if placed == 0 => Err(CommandFailure::World(error.to_string())),
            _ => Ok(format!("placed {placed} of {} {}", cells.len(), voxel.name)),
        }
    }
}

impl CommandExecutor for PlaceBlockExecutor {
    fn command_type(&self) -> CommandType {
        CommandType::PlaceBlock
    }

    #[instrument(skip(self, params, completion), fields(command = "place_block"))]
    fn execute(&mut self, command_id: &CommandId, params: &str, completion: Completion) {
        match self.run(params) {
            Ok(summary) => completion.complete(summary),
            Err(failure) => completion.fail(failure),
        }
    }
}

pub struct DestroyBlockExecutor {
    context: BlockContext,
}

impl DestroyBlockExecutor {
    pub fn new(
        world: Arc<dyn WorldEditor>,
        body: Arc<dyn AgentBody>,
        aggregator: Option<BuildEventAggregator>,
    ) -> Self {
        Self {
            context: BlockContext {
                world,
                body,
                aggregator,
            },
        }
    }

    fn run(&self, params: &str) -> Result<String, CommandFailure> {
        let params: DestroyParams = parse_params(params)?;
        let cells = params.target.resolve(&self.context.body.pose())?;

        let mut removed = 0usize;
        let mut last_error = None;
        for cell in &cells {
            let Some(voxel) = self.context.world.voxel_at(*cell) else {
                continue;
            };
            if !params.accepts(&voxel) {
                debug!(?cell, voxel = %voxel.name, "filtered out");
                continue;
            }
            match self.context.world.remove_voxel(*cell) {
                Ok(Some(previous)) => {
                    removed += 1;
                    self.context.record(BuildActionKind::Remove, *cell, &previous);
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(?cell, %error, "remove failed");
                    last_error = Some(error);
                }
            }
        }

        match last_error {
            Some(error) if removed == 0 => Err(CommandFailure::World(error.to_string())),
            _ => Ok(format!("removed {removed} of {} cells", cells.len())),
        }
    }
}

impl CommandExecutor for DestroyBlockExecutor {
    fn command_type(&self) -> CommandType {
        CommandType::DestroyBlock
    }

    #[instrument(skip(self, params, completion), fields(command = "destroy_block"))]
    fn execute(&mut self, command_id: &CommandId, params: &str, completion: Completion) {
        match self.run(params) {
            Ok(summary) => completion.complete(summary),
            Err(failure) => completion.fail(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftlink_events::{AggregatorConfig, BufferedProducer, EventBus};
    use craftlink_protocol::{BuildPayload, CommandPhase, Vec3};
    use craftlink_world::{GridWorld, InMemoryVoxelRegistry, SimulatedBody};
    use parking_lot::Mutex;

    fn run(executor: &mut dyn CommandExecutor, params: &str) -> crate::CommandOutcome {
        let (completion, mut receiver) =
            Completion::channel(CommandId::from_string("c1"), executor.command_type());
        executor.execute(&CommandId::from_string("c1"), params, completion);
        receiver.try_recv().expect("completed synchronously")
    }

    #[test]
    fn place_up_three_from_agent_cell() {
        let world = Arc::new(GridWorld::new());
        let body = Arc::new(SimulatedBody::at(Vec3::new(5.0, 10.0, 5.0)));
        let mut executor = PlaceBlockExecutor::new(
            world.clone(),
            body,
            Arc::new(InMemoryVoxelRegistry::with_builtin_types()),
            None,
        );
        let outcome = run(
            &mut executor,
            r#"{"start_offset":{"x":0,"y":0,"z":0},"expand_direction":"up","count":3,"voxel_name":"wood"}"#,
        );
        assert!(outcome.is_success(), "{outcome:?}");
        for y in 10..13 {
            assert_eq!(
                world.voxel_at(CellPos::new(5, y, 5)).map(|v| v.name),
                Some("wood".to_owned())
            );
        }
        assert_eq!(world.len(), 3);
    }

    #[test]
    fn place_with_unknown_voxel_fails() {
        let mut executor = PlaceBlockExecutor::new(
            Arc::new(GridWorld::new()),
            Arc::new(SimulatedBody::at(Vec3::ZERO)),
            Arc::new(InMemoryVoxelRegistry::with_builtin_types()),
            None,
        );
        let outcome = run(&mut executor, r#"{"voxel_id":"99"}"#);
        assert_eq!(
            outcome.result,
            Err(CommandFailure::UnknownVoxelType("99".into()))
        );
        let outcome = run(&mut executor, r#"{"count":2}"#);
        assert!(matches!(
            outcome.result,
            Err(CommandFailure::MalformedParams(_))
        ));
    }

    #[test]
    fn far_offset_fails_without_touching_world() {
        let world = Arc::new(GridWorld::new());
        let mut executor = PlaceBlockExecutor::new(
            world.clone(),
            Arc::new(SimulatedBody::at(Vec3::new(5.0, 10.0, 5.0))),
            Arc::new(InMemoryVoxelRegistry::with_builtin_types()),
            None,
        );
        let outcome = run(
            &mut executor,
            r#"{"start_offset":{"x":3e9},"expand_direction":"right","count":2,"voxel_name":"stone"}"#,
        );
        assert!(matches!(
            outcome.result,
            Err(CommandFailure::MalformedParams(_))
        ));
        assert!(world.is_empty());
    }

    #[test]
    fn destroy_filters_by_name_and_reports_edits() {
        let world = Arc::new(
            GridWorld::new()
                .with_voxel(CellPos::new(0, 0, 1), "1", "stone")
                .with_voxel(CellPos::new(0, 0, 2), "2", "dirt"),
        );
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |payload: &BuildPayload| sink.lock().push(payload.clone()));
        let aggregator = BuildEventAggregator::new(bus, AggregatorConfig::default());

        let mut executor = DestroyBlockExecutor::new(
            world.clone(),
            Arc::new(SimulatedBody::at(Vec3::new(0.5, 0.0, 0.5))),
            Some(aggregator.clone()),
        );
        let outcome = run(
            &mut executor,
            r#"{"start_offset":{"z":1},"expand_direction":"forward","count":2,"voxel_names":["stone"]}"#,
        );
        assert_eq!(outcome.phase(), CommandPhase::Completed);
        assert!(world.voxel_at(CellPos::new(0, 0, 1)).is_none());
        assert_eq!(
            world.voxel_at(CellPos::new(0, 0, 2)).map(|v| v.name),
            Some("dirt".to_owned())
        );

        assert_eq!(aggregator.flush_pending(), 1);
        let seen = seen.lock();
        assert_eq!(seen[0].actions.len(), 1);
        assert_eq!(seen[0].actions[0].action, BuildActionKind::Remove);
        assert_eq!(seen[0].actions[0].voxel_name, "stone");
    }

    #[test]
    fn protected_cells_surface_world_errors() {
        let world = Arc::new(GridWorld::new().with_voxel(CellPos::new(0, 1, 0), "1", "stone"));
        world.lock_cell(CellPos::new(0, 1, 0));
        let mut executor = DestroyBlockExecutor::new(
            world,
            Arc::new(SimulatedBody::at(Vec3::ZERO)),
            None,
        );
        let outcome = run(&mut executor, r#"{"start_offset":{"y":1}}"#);
        assert!(matches!(outcome.result, Err(CommandFailure::World(_))));
    }
}
