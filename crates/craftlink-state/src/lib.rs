//! Live game state tracker.
//!
//! Owns the single mutable view of what the agent currently knows and renders
//! it into immutable [`GameStateSnapshot`]s on demand. Every accessor copies
//! out; nothing hands back a reference into the live state.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use craftlink_events::SessionClock;
use craftlink_protocol::{
    CellPos, CommandId, CommandPhase, DirectionProbe, GameStateSnapshot, LastCommandEntry,
    NearbyVoxel, PendingPlanEntry, PlanItemId, ScanDirection, SixDirectionScan, Vec3,
    VoxelTypeRegistry, WorldQuery,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Pending plans and last commands kept in a snapshot.
pub const HISTORY_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Scan range per direction, in cells; also the distance reported for
    /// an empty direction.
    pub max_scan_distance: u32,
    /// Taxicab radius of the nearby-voxel listing.
    pub nearby_radius: u32,
    pub nearby_limit: usize,
    /// Cadence of the background scan driven by [`GameStateTracker::tick`].
    pub auto_scan_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_scan_distance: 10,
            nearby_radius: 4,
            nearby_limit: 32,
            auto_scan_interval_ms: 1_000,
        }
    }
}

impl ScanConfig {
    pub fn auto_scan_interval(&self) -> Duration {
        Duration::from_millis(self.auto_scan_interval_ms)
    }
}

#[derive(Debug, Clone, Default)]
struct LiveState {
    agent_position: Vec3,
    operator_relative_position: Option<Vec3>,
    six_direction_scan: SixDirectionScan,
    nearby_voxels: Vec<NearbyVoxel>,
    pending_plans: VecDeque<PendingPlanEntry>,
    last_commands: VecDeque<LastCommandEntry>,
}

pub struct GameStateTracker {
    config: ScanConfig,
    clock: SessionClock,
    world: Option<Arc<dyn WorldQuery>>,
    registry: Option<Arc<dyn VoxelTypeRegistry>>,
    live: LiveState,
    last_scan_at: Option<Instant>,
}

impl GameStateTracker {
    pub fn new(config: ScanConfig, clock: SessionClock) -> Self {
        Self {
            config,
            clock,
            world: None,
            registry: None,
            live: LiveState::default(),
            last_scan_at: None,
        }
    }

    pub fn with_world(mut self, world: Arc<dyn WorldQuery>) -> Self {
        self.world = Some(world);
        self
    }

    pub fn with_registry(mut self, registry: Arc<dyn VoxelTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn attach_world(&mut self, world: Arc<dyn WorldQuery>) {
        self.world = Some(world);
    }

    /// Simulates the world being unloaded (e.g. during a scene reload).
    pub fn detach_world(&mut self) {
        self.world = None;
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn set_clock(&mut self, clock: SessionClock) {
        self.clock = clock;
    }

    // ── setters ──

    pub fn update_agent_position(&mut self, position: Vec3) {
        self.live.agent_position = position;
    }

    pub fn update_operator_relative_position(&mut self, relative: Option<Vec3>) {
        self.live.operator_relative_position = relative;
    }

    /// Record the operator's world position relative to the agent's current one.
    pub fn update_operator_world_position(&mut self, operator: Vec3) {
        self.live.operator_relative_position = Some(operator - self.live.agent_position);
    }

    pub fn update_six_direction_scan(&mut self, scan: SixDirectionScan) {
        self.live.six_direction_scan = scan;
    }

    pub fn update_nearby_voxels(&mut self, voxels: Vec<NearbyVoxel>) {
        self.live.nearby_voxels = voxels;
    }

    pub fn agent_position(&self) -> Vec3 {
        self.live.agent_position
    }

    // ── scanning ──

    /// Recompute the six-direction scan and nearby voxels from the world.
    /// Returns false, leaving state untouched, when no world is attached.
    #[instrument(skip(self))]
    pub fn perform_auto_scan(&mut self) -> bool {
        let Some(world) = self.world.clone() else {
            warn!("world query unavailable; skipping auto scan");
            return false;
        };
        let agent_cell = self.live.agent_position.cell();
        self.live.six_direction_scan =
            scan_six_directions(world.as_ref(), agent_cell, self.config.max_scan_distance);
        self.live.nearby_voxels = scan_nearby(
            world.as_ref(),
            agent_cell,
            self.config.nearby_radius,
            self.config.nearby_limit,
        );
        debug!(
            nearby = self.live.nearby_voxels.len(),
            "auto scan refreshed"
        );
        true
    }

    pub fn should_auto_scan(&self, now: Instant) -> bool {
        self.last_scan_at.is_none_or(|last| {
            now.saturating_duration_since(last) >= self.config.auto_scan_interval()
        })
    }

    /// Run the periodic scan if its interval has elapsed.
    pub fn tick(&mut self, now: Instant) -> bool {
        if !self.should_auto_scan(now) {
            return false;
        }
        self.last_scan_at = Some(now);
        self.perform_auto_scan()
    }

    // ── pending plans ──

    pub fn add_pending_plan(&mut self, entry: PendingPlanEntry) {
        self.live.pending_plans.retain(|p| p.id != entry.id);
        push_bounded(&mut self.live.pending_plans, entry);
    }

    pub fn remove_pending_plan(&mut self, id: &PlanItemId) -> bool {
        let before = self.live.pending_plans.len();
        self.live.pending_plans.retain(|p| &p.id != id);
        before != self.live.pending_plans.len()
    }

    pub fn clear_pending_plans(&mut self) {
        self.live.pending_plans.clear();
    }

    pub fn pending_plans(&self) -> Vec<PendingPlanEntry> {
        self.live.pending_plans.iter().cloned().collect()
    }

    // ── last commands ──

    pub fn add_last_command(&mut self, entry: LastCommandEntry) {
        self.live.last_commands.retain(|c| c.id != entry.id);
        push_bounded(&mut self.live.last_commands, entry);
    }

    pub fn remove_last_command(&mut self, id: &CommandId) -> bool {
        let before = self.live.last_commands.len();
        self.live.last_commands.retain(|c| &c.id != id);
        before != self.live.last_commands.len()
    }

    pub fn clear_last_commands(&mut self) {
        self.live.last_commands.clear();
    }

    /// Returns false if the command has already been evicted.
    pub fn update_last_command_phase(&mut self, id: &CommandId, phase: CommandPhase) -> bool {
        match self.live.last_commands.iter_mut().find(|c| &c.id == id) {
            Some(entry) => {
                entry.phase = phase;
                true
            }
            None => false,
        }
    }

    pub fn last_commands(&self) -> Vec<LastCommandEntry> {
        self.live.last_commands.iter().cloned().collect()
    }

    pub fn last_command(&self, id: &CommandId) -> Option<LastCommandEntry> {
        self.live.last_commands.iter().find(|c| &c.id == id).cloned()
    }

    // ── snapshots ──

    /// Deep copy of the tracked state plus the registry's voxel catalog.
    pub fn snapshot(&self) -> GameStateSnapshot {
        let voxel_type_catalog = match &self.registry {
            Some(registry) => registry.list_all(),
            None => {
                debug!("voxel type registry unavailable; snapshot catalog is empty");
                Vec::new()
            }
        };
        GameStateSnapshot {
            timestamp: self.clock.stamp(),
            agent_position: self.live.agent_position,
            operator_relative_position: self.live.operator_relative_position,
            six_direction_scan: self.live.six_direction_scan.clone(),
            nearby_voxels: self.live.nearby_voxels.clone(),
            pending_plans: self.pending_plans(),
            last_commands: self.last_commands(),
            voxel_type_catalog,
        }
    }

    /// Scan immediately, then snapshot, bypassing the periodic cadence.
    pub fn fresh_snapshot(&mut self) -> GameStateSnapshot {
        self.perform_auto_scan();
        self.last_scan_at = Some(Instant::now());
        self.snapshot()
    }

    /// Forget everything tracked; collaborators stay attached.
    pub fn reset(&mut self) {
        self.live = LiveState::default();
        self.last_scan_at = None;
    }
}

fn push_bounded<T>(history: &mut VecDeque<T>, entry: T) {
    history.push_back(entry);
    while history.len() > HISTORY_LIMIT {
        history.pop_front();
    }
}

/// Probe each world axis starting one cell beyond the agent's own cell.
/// Distances are taxicab from the agent cell, capped at `max_distance`.
pub fn scan_six_directions(
    world: &dyn WorldQuery,
    agent_cell: CellPos,
    max_distance: u32,
) -> SixDirectionScan {
    ScanDirection::ALL
        .iter()
        .map(|direction| {
            let step = direction.unit();
            let origin = agent_cell.offset(step, 1);
            let probe = match world.raycast(origin, step, max_distance) {
                Some(hit) => DirectionProbe {
                    name: hit.voxel.name,
                    id: hit.voxel.id,
                    distance: hit.cell.taxicab_distance(agent_cell).min(max_distance),
                },
                None => DirectionProbe::empty(max_distance),
            };
            (direction.as_str().to_owned(), probe)
        })
        .collect()
}

/// Occupied cells around the agent, nearest first.
pub fn scan_nearby(
    world: &dyn WorldQuery,
    agent_cell: CellPos,
    radius: u32,
    limit: usize,
) -> Vec<NearbyVoxel> {
    let mut voxels: Vec<NearbyVoxel> = world
        .occupied_cells_near(agent_cell, radius)
        .into_iter()
        .map(|(position, voxel)| NearbyVoxel {
            id: voxel.id,
            name: voxel.name,
            position,
            distance: position.taxicab_distance(agent_cell),
        })
        .collect();
    voxels.sort_by(|a, b| {
        a.distance
            .cmp(&b.distance)
            .then_with(|| a.position.cmp(&b.position))
    });
    voxels.truncate(limit);
    voxels
}
