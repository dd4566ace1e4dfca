use std::sync::Arc;
use std::time::{Duration, Instant};

use craftlink_protocol::{BuildAction, BuildPayload};
use parking_lot::Mutex;
use tracing::debug;

use crate::bus::EventBus;

/// A producer that buffers its own side effects and can be asked to publish
/// them synchronously, e.g. right before a batch is sealed.
pub trait BufferedProducer: Send + Sync {
    fn name(&self) -> &str;
    /// Publish anything buffered. Returns the number of events published.
    fn flush_pending(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Publish once no edit has arrived for this long.
    pub quiet_window: Duration,
    /// Publish as soon as this many edits are buffered.
    pub max_actions: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            quiet_window: Duration::from_secs(2),
            max_actions: 64,
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    actions: Vec<BuildAction>,
    last_edit_at: Option<Instant>,
}

/// Groups individual voxel placements and removals into one `build` event.
#[derive(Debug, Clone)]
pub struct BuildEventAggregator {
    bus: EventBus,
    config: AggregatorConfig,
    pending: Arc<Mutex<Pending>>,
}

impl BuildEventAggregator {
    pub fn new(bus: EventBus, config: AggregatorConfig) -> Self {
        Self {
            bus,
            config,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    pub fn record(&self, action: BuildAction) {
        self.record_at(action, Instant::now());
    }

    pub fn record_at(&self, action: BuildAction, now: Instant) {
        let full = {
            let mut pending = self.pending.lock();
            pending.actions.push(action);
            pending.last_edit_at = Some(now);
            pending.actions.len() >= self.config.max_actions
        };
        if full {
            self.flush_pending();
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().actions.len()
    }

    /// Flush if the quiet window has elapsed since the last edit.
    pub fn flush_if_quiet(&self, now: Instant) -> usize {
        let quiet = self.pending.lock().last_edit_at.is_some_and(|last| {
            now.saturating_duration_since(last) >= self.config.quiet_window
        });
        if quiet { self.flush_pending() } else { 0 }
    }

    /// Drop buffered edits without publishing.
    pub fn discard(&self) {
        let mut pending = self.pending.lock();
        pending.actions.clear();
        pending.last_edit_at = None;
    }
}

impl BufferedProducer for BuildEventAggregator {
    fn name(&self) -> &str {
        "build-aggregator"
    }

    fn flush_pending(&self) -> usize {
        let actions = {
            let mut pending = self.pending.lock();
            pending.last_edit_at = None;
            std::mem::take(&mut pending.actions)
        };
        if actions.is_empty() {
            return 0;
        }
        debug!(actions = actions.len(), "publishing grouped build edits");
        self.bus.publish(&BuildPayload { actions });
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftlink_protocol::{BuildActionKind, CellPos, VoxelTypeId};

    fn place(x: i32) -> BuildAction {
        BuildAction {
            action: BuildActionKind::Place,
            position: CellPos::new(x, 0, 0),
            voxel_id: VoxelTypeId::from_string("1"),
            voxel_name: "stone".into(),
        }
    }

    fn collect(bus: &EventBus) -> Arc<Mutex<Vec<BuildPayload>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe(move |payload: &BuildPayload| sink.lock().push(payload.clone()));
        seen
    }

    #[test]
    fn groups_edits_into_one_event() {
        let bus = EventBus::new();
        let seen = collect(&bus);
        let aggregator = BuildEventAggregator::new(bus, AggregatorConfig::default());
        aggregator.record(place(0));
        aggregator.record(place(1));
        assert_eq!(aggregator.flush_pending(), 1);
        assert_eq!(aggregator.flush_pending(), 0);
        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].actions.len(), 2);
    }

    #[test]
    fn quiet_window_and_size_cap_trigger_publication() {
        let bus = EventBus::new();
        let seen = collect(&bus);
        let aggregator = BuildEventAggregator::new(
            bus,
            AggregatorConfig {
                quiet_window: Duration::from_secs(1),
                max_actions: 3,
            },
        );
        let start = Instant::now();
        aggregator.record_at(place(0), start);
        assert_eq!(aggregator.flush_if_quiet(start + Duration::from_millis(500)), 0);
        assert_eq!(aggregator.flush_if_quiet(start + Duration::from_secs(1)), 1);

        for x in 0..3 {
            aggregator.record_at(place(x), start);
        }
        assert_eq!(aggregator.pending_len(), 0);
        assert_eq!(seen.lock().len(), 2);
    }
}
