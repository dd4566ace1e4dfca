//! Batching and flush control.
//!
//! Producers publish payloads on the [`EventBus`]; the controller stamps each
//! one into the open [`EventBatch`] and decides, once per control-loop
//! iteration, whether the batch is sealed and handed to the transport.
//!
//! A batch moves `Open -> (AwaitingPerception) -> sealed`, after which a new
//! empty batch takes its place. The sealed batch is owned by the caller and
//! is never touched by producers again.
//!
//! Immediate events (speech, continue_plan, perception) never wait on a
//! capture in flight: the open batch is sealed at once and the capture's
//! perception event is sent in a later batch when it resolves.

use std::sync::Arc;
use std::time::{Duration, Instant};

use craftlink_events::{BufferedProducer, EventBus, SessionClock};
use craftlink_protocol::{
    BuildPayload, ContinuePlanPayload, Event, EventBatch, EventPayload, ImageRef, LinkError,
    PerceptionPayload, PhotoCapture, SessionId, SpeechPayload, VoxelTypeChangedPayload,
    VoxelTypeCreatedPayload,
};
use craftlink_state::GameStateTracker;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot::{self, error::TryRecvError};
use tracing::{debug, info, instrument, trace, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub flush_interval_ms: u64,
    /// Events required before the interval alone may trigger a flush.
    pub min_events: usize,
    /// Flush as soon as the batch holds this many events.
    pub max_events: usize,
    /// Give up waiting for directional images after this long.
    pub capture_timeout_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            flush_interval_ms: 10_000,
            min_events: 1,
            max_events: 20,
            capture_timeout_ms: 5_000,
        }
    }
}

impl BatchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn capture_timeout(&self) -> Duration {
        Duration::from_millis(self.capture_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchPhase {
    Open,
    AwaitingPerception,
}

/// A sealed batch and its `POST /events` body.
#[derive(Debug, Clone)]
pub struct OutboundBatch {
    pub batch: EventBatch,
    pub body: String,
}

/// A batch that was sealed but refused before any network call.
#[derive(Debug)]
pub struct RejectedBatch {
    pub batch: EventBatch,
    pub error: LinkError,
}

struct InFlightCapture {
    receiver: oneshot::Receiver<Vec<ImageRef>>,
    started_at: Instant,
}

type Unsubscribe = Box<dyn Fn(&EventBus) + Send + Sync>;

pub struct BatchController {
    config: BatchConfig,
    bus: EventBus,
    clock: SessionClock,
    session_id: SessionId,
    current: Arc<Mutex<EventBatch>>,
    producers: Vec<Arc<dyn BufferedProducer>>,
    capture: Option<Arc<dyn PhotoCapture>>,
    in_flight: Option<InFlightCapture>,
    perception_requested: bool,
    last_flush_at: Instant,
    rejected: Option<RejectedBatch>,
    unsubscribers: Vec<Unsubscribe>,
}

impl BatchController {
    /// Create a controller and subscribe it to every event payload on `bus`.
    pub fn new(
        config: BatchConfig,
        bus: EventBus,
        clock: SessionClock,
        session_id: SessionId,
    ) -> Self {
        let mut controller = Self {
            config,
            bus,
            clock,
            current: Arc::new(Mutex::new(EventBatch::new(session_id.clone()))),
            session_id,
            producers: Vec::new(),
            capture: None,
            in_flight: None,
            perception_requested: false,
            last_flush_at: clock.started_at(),
            rejected: None,
            unsubscribers: Vec::new(),
        };
        controller.attach();
        controller
    }

    pub fn with_capture(mut self, capture: Arc<dyn PhotoCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn set_capture(&mut self, capture: Option<Arc<dyn PhotoCapture>>) {
        self.capture = capture;
    }

    /// Register a producer to be drained right before each batch is sealed.
    pub fn add_producer(&mut self, producer: Arc<dyn BufferedProducer>) {
        self.producers.push(producer);
    }

    /// Subscribe to all six payload shapes. No-op when already attached.
    pub fn attach(&mut self) {
        if !self.unsubscribers.is_empty() {
            return;
        }
        self.subscribe_payload::<SpeechPayload>();
        self.subscribe_payload::<BuildPayload>();
        self.subscribe_payload::<VoxelTypeCreatedPayload>();
        self.subscribe_payload::<VoxelTypeChangedPayload>();
        self.subscribe_payload::<ContinuePlanPayload>();
        self.subscribe_payload::<PerceptionPayload>();
    }

    pub fn detach(&mut self) {
        for unsubscribe in self.unsubscribers.drain(..) {
            unsubscribe(&self.bus);
        }
    }

    fn subscribe_payload<P>(&mut self)
    where
        P: Clone + Into<EventPayload> + 'static,
    {
        let batch = Arc::clone(&self.current);
        let clock = self.clock;
        let id = self.bus.subscribe(move |payload: &P| {
            let event = Event::new(clock.stamp(), payload.clone());
            trace!(event_type = event.event_type.as_str(), "event appended");
            batch.lock().push(event);
        });
        self.unsubscribers.push(Box::new(move |bus: &EventBus| {
            bus.unsubscribe::<P>(id);
        }));
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn phase(&self) -> BatchPhase {
        if self.in_flight.is_some() {
            BatchPhase::AwaitingPerception
        } else {
            BatchPhase::Open
        }
    }

    pub fn pending_len(&self) -> usize {
        self.current.lock().len()
    }

    /// Copy of the open batch.
    pub fn current_batch(&self) -> EventBatch {
        self.current.lock().clone()
    }

    /// The most recent batch refused by validation, if any.
    pub fn take_rejected(&mut self) -> Option<RejectedBatch> {
        self.rejected.take()
    }

    /// Capture directional images and flush on the next evaluation,
    /// regardless of thresholds.
    pub fn request_perception(&mut self) {
        self.perception_requested = true;
    }

    /// Decide whether the open batch should be sealed now.
    #[instrument(skip(self, tracker), fields(session_id = %self.session_id))]
    pub fn evaluate(
        &mut self,
        now: Instant,
        tracker: &mut GameStateTracker,
    ) -> Option<OutboundBatch> {
        let (len, immediate) = {
            let batch = self.current.lock();
            (batch.len(), batch.has_immediate_event())
        };
        if immediate {
            // A capture still in flight stays pending and lands in the next batch.
            debug!(
                events = len,
                capturing = self.in_flight.is_some(),
                "immediate event present"
            );
            return self.flush_now(now, tracker);
        }
        if self.in_flight.is_some() {
            return self.poll_capture(now, tracker);
        }

        let interval_due = now.saturating_duration_since(self.last_flush_at)
            >= self.config.flush_interval()
            && len >= self.config.min_events;
        let full = len >= self.config.max_events;
        if !(interval_due || full || self.perception_requested) {
            return None;
        }
        debug!(events = len, interval_due, full, "flush triggered");
        self.perception_requested = false;
        if self.begin_capture(now) {
            self.poll_capture(now, tracker)
        } else {
            self.flush_now(now, tracker)
        }
    }

    fn begin_capture(&mut self, now: Instant) -> bool {
        let Some(capture) = self.capture.clone() else {
            debug!("photo capture unavailable; flushing without perception");
            return false;
        };
        let (sender, receiver) = oneshot::channel();
        self.in_flight = Some(InFlightCapture {
            receiver,
            started_at: now,
        });
        capture.capture_four_directions(Box::new(move |images| {
            let _ = sender.send(images);
        }));
        true
    }

    fn poll_capture(&mut self, now: Instant, tracker: &mut GameStateTracker) -> Option<OutboundBatch> {
        let in_flight = self.in_flight.as_mut()?;
        let images = match in_flight.receiver.try_recv() {
            Ok(images) => images,
            Err(TryRecvError::Empty) => {
                if now.saturating_duration_since(in_flight.started_at)
                    < self.config.capture_timeout()
                {
                    return None;
                }
                warn!("perception capture timed out; flushing without images");
                Vec::new()
            }
            Err(TryRecvError::Closed) => {
                warn!("perception capture dropped its callback");
                Vec::new()
            }
        };
        self.in_flight = None;

        let payload = PerceptionPayload::new(images);
        if payload.images.is_empty() {
            info!("capture returned no images; flushing without perception");
        } else {
            self.bus.publish(&payload);
        }
        self.flush_now(now, tracker)
    }

    /// Seal and hand off the open batch, bypassing every trigger rule.
    ///
    /// Buffered producers are drained first and the snapshot is taken after
    /// them. An empty batch is not sent. The open batch is replaced whether
    /// or not the sealed one passes validation.
    #[instrument(skip(self, tracker), fields(session_id = %self.session_id))]
    pub fn flush_now(
        &mut self,
        now: Instant,
        tracker: &mut GameStateTracker,
    ) -> Option<OutboundBatch> {
        self.last_flush_at = now;
        for producer in &self.producers {
            let published = producer.flush_pending();
            if published > 0 {
                debug!(producer = producer.name(), published, "producer flushed");
            }
        }

        let mut batch = {
            let mut current = self.current.lock();
            if current.is_empty() {
                debug!("nothing to send");
                return None;
            }
            std::mem::replace(&mut *current, EventBatch::new(self.session_id.clone()))
        };

        batch.game_state = Some(tracker.fresh_snapshot());
        if let Err(error) = batch.validate() {
            warn!(%error, events = batch.len(), "batch failed validation; not sent");
            self.rejected = Some(RejectedBatch {
                batch,
                error: error.into(),
            });
            return None;
        }
        match batch.to_json() {
            Ok(body) => {
                info!(events = batch.len(), bytes = body.len(), "batch sealed");
                Some(OutboundBatch { batch, body })
            }
            Err(error) => {
                warn!(%error, "batch could not be encoded; not sent");
                self.rejected = Some(RejectedBatch { batch, error });
                None
            }
        }
    }

    /// Start over for a new session: drop the open batch, any capture in
    /// flight and any rejected batch, then resubscribe.
    pub fn reset(&mut self, session_id: SessionId, clock: SessionClock) {
        self.detach();
        self.clock = clock;
        self.session_id = session_id.clone();
        *self.current.lock() = EventBatch::new(session_id);
        self.in_flight = None;
        self.perception_requested = false;
        self.rejected = None;
        self.last_flush_at = clock.started_at();
        self.attach();
    }
}

impl Drop for BatchController {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftlink_events::{AggregatorConfig, BuildEventAggregator};
    use craftlink_protocol::{
        BatchValidationError, BuildAction, BuildActionKind, CellPos, EventType, VoxelTypeId,
    };
    use craftlink_state::ScanConfig;
    use craftlink_world::StaticPhotoCapture;

    struct Harness {
        bus: EventBus,
        start: Instant,
        controller: BatchController,
        tracker: GameStateTracker,
    }

    fn harness(config: BatchConfig) -> Harness {
        let bus = EventBus::new();
        let start = Instant::now();
        let clock = SessionClock::starting_at(start);
        let controller =
            BatchController::new(config, bus.clone(), clock, SessionId::from_string("s1"));
        Harness {
            bus,
            start,
            controller,
            tracker: GameStateTracker::new(ScanConfig::default(), clock),
        }
    }

    fn build_payload() -> BuildPayload {
        BuildPayload {
            actions: vec![BuildAction {
                action: BuildActionKind::Place,
                position: CellPos::new(1, 0, 0),
                voxel_id: VoxelTypeId::from_string("1"),
                voxel_name: "stone".into(),
            }],
        }
    }

    #[test]
    fn speech_and_perception_flush_immediately() {
        let mut h = harness(BatchConfig::default());
        h.bus.publish(&SpeechPayload::new("look at this"));
        h.bus
            .publish(&PerceptionPayload::new(vec![ImageRef::from_file_name("a.png")]));

        let outbound = h
            .controller
            .evaluate(h.start + Duration::from_millis(10), &mut h.tracker)
            .expect("immediate flush");
        assert_eq!(outbound.batch.events.len(), 2);
        assert_eq!(outbound.batch.events[0].event_type, EventType::Speech);
        assert_eq!(outbound.batch.events[1].event_type, EventType::Perception);
        assert!(outbound.batch.game_state.is_some());

        let body: serde_json::Value = serde_json::from_str(&outbound.body).unwrap();
        assert_eq!(body["session_id"], "s1");
        assert!(body["game_state"].is_object());
        assert_eq!(h.controller.pending_len(), 0);
    }

    #[test]
    fn below_thresholds_waits() {
        let mut h = harness(BatchConfig::default());
        h.bus.publish(&build_payload());
        assert!(
            h.controller
                .evaluate(h.start + Duration::from_secs(1), &mut h.tracker)
                .is_none()
        );
        assert_eq!(h.controller.pending_len(), 1);
    }

    #[test]
    fn interval_flush_attaches_perception() {
        let mut h = harness(BatchConfig::default());
        h.controller
            .set_capture(Some(Arc::new(StaticPhotoCapture::four_views("tick"))));
        h.bus.publish(&build_payload());

        let outbound = h
            .controller
            .evaluate(h.start + Duration::from_secs(10), &mut h.tracker)
            .expect("interval flush");
        let types: Vec<_> = outbound.batch.events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Build, EventType::Perception]);
    }

    #[test]
    fn capture_in_flight_suppresses_triggers() {
        let config = BatchConfig {
            max_events: 2,
            ..BatchConfig::default()
        };
        let mut h = harness(config);
        let capture = Arc::new(StaticPhotoCapture::deferred());
        h.controller.set_capture(Some(capture.clone()));
        h.bus.publish(&build_payload());
        h.bus.publish(&build_payload());

        let now = h.start + Duration::from_millis(100);
        assert!(h.controller.evaluate(now, &mut h.tracker).is_none());
        assert_eq!(h.controller.phase(), BatchPhase::AwaitingPerception);
        h.bus.publish(&build_payload());
        assert!(h.controller.evaluate(now, &mut h.tracker).is_none());
        assert_eq!(capture.requests(), 1);

        capture.resolve_pending(vec![ImageRef::from_file_name("front.png")]);
        let outbound = h.controller.evaluate(now, &mut h.tracker).expect("flush");
        assert_eq!(outbound.batch.events.len(), 4);
        assert!(outbound.batch.contains_type(EventType::Perception));
        assert_eq!(h.controller.phase(), BatchPhase::Open);
    }

    #[test]
    fn speech_during_capture_flushes_without_waiting() {
        let mut h = harness(BatchConfig::default());
        let capture = Arc::new(StaticPhotoCapture::deferred());
        h.controller.set_capture(Some(capture.clone()));
        h.bus.publish(&build_payload());

        let due = h.start + Duration::from_secs(10);
        assert!(h.controller.evaluate(due, &mut h.tracker).is_none());
        assert_eq!(h.controller.phase(), BatchPhase::AwaitingPerception);

        h.bus.publish(&SpeechPayload::new("over here"));
        let outbound = h
            .controller
            .evaluate(due + Duration::from_millis(50), &mut h.tracker)
            .expect("speech is not held back by the capture");
        let types: Vec<_> = outbound.batch.events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Build, EventType::Speech]);
        assert_eq!(h.controller.phase(), BatchPhase::AwaitingPerception);

        capture.resolve_pending(vec![ImageRef::from_file_name("front.png")]);
        let later = h
            .controller
            .evaluate(due + Duration::from_millis(100), &mut h.tracker)
            .expect("capture result follows in its own batch");
        let types: Vec<_> = later.batch.events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Perception]);
        assert_eq!(h.controller.phase(), BatchPhase::Open);
        assert_eq!(capture.requests(), 1);
    }

    #[test]
    fn empty_capture_degrades_to_plain_flush() {
        let mut h = harness(BatchConfig::default());
        h.controller
            .set_capture(Some(Arc::new(StaticPhotoCapture::immediate(Vec::new()))));
        h.bus.publish(&build_payload());
        let outbound = h
            .controller
            .evaluate(h.start + Duration::from_secs(11), &mut h.tracker)
            .expect("flush");
        assert_eq!(outbound.batch.events.len(), 1);
        assert!(!outbound.batch.contains_type(EventType::Perception));
    }

    #[test]
    fn capture_timeout_flushes_without_images() {
        let mut h = harness(BatchConfig::default());
        h.controller
            .set_capture(Some(Arc::new(StaticPhotoCapture::deferred())));
        h.bus.publish(&build_payload());
        let due = h.start + Duration::from_secs(10);
        assert!(h.controller.evaluate(due, &mut h.tracker).is_none());
        assert!(
            h.controller
                .evaluate(due + Duration::from_secs(1), &mut h.tracker)
                .is_none()
        );
        let outbound = h
            .controller
            .evaluate(due + Duration::from_secs(5), &mut h.tracker)
            .expect("flush after timeout");
        assert_eq!(outbound.batch.events.len(), 1);
    }

    #[test]
    fn producers_drain_before_sealing() {
        let mut h = harness(BatchConfig::default());
        let aggregator = Arc::new(BuildEventAggregator::new(
            h.bus.clone(),
            AggregatorConfig::default(),
        ));
        h.controller.add_producer(aggregator.clone());
        aggregator.record(build_payload().actions.remove(0));
        assert_eq!(h.controller.pending_len(), 0);

        h.controller.request_perception();
        let outbound = h
            .controller
            .evaluate(h.start, &mut h.tracker)
            .expect("producer events flushed");
        assert_eq!(outbound.batch.events[0].event_type, EventType::Build);
        assert_eq!(aggregator.pending_len(), 0);
    }

    #[test]
    fn empty_batch_is_not_sent() {
        let mut h = harness(BatchConfig::default());
        h.controller.request_perception();
        assert!(h.controller.evaluate(h.start, &mut h.tracker).is_none());
        assert!(h.controller.take_rejected().is_none());
    }

    #[test]
    fn invalid_batch_is_retained_and_replaced() {
        let bus = EventBus::new();
        let clock = SessionClock::start();
        let mut controller =
            BatchController::new(BatchConfig::default(), bus.clone(), clock, SessionId::default());
        let mut tracker = GameStateTracker::new(ScanConfig::default(), clock);
        bus.publish(&SpeechPayload::new("hi"));

        assert!(controller.evaluate(Instant::now(), &mut tracker).is_none());
        let rejected = controller.take_rejected().expect("retained");
        assert_eq!(rejected.batch.events.len(), 1);
        assert!(matches!(
            rejected.error,
            LinkError::Validation(BatchValidationError::EmptySessionId)
        ));
        assert_eq!(controller.pending_len(), 0);
    }

    #[test]
    fn reset_switches_session_and_drops_open_events() {
        let mut h = harness(BatchConfig::default());
        h.bus.publish(&build_payload());
        h.controller
            .reset(SessionId::from_string("s2"), SessionClock::start());
        assert_eq!(h.controller.pending_len(), 0);
        assert_eq!(h.bus.subscriber_count::<SpeechPayload>(), 1);

        h.bus.publish(&SpeechPayload::new("again"));
        assert_eq!(h.controller.current_batch().session_id.as_str(), "s2");
        assert_eq!(h.controller.pending_len(), 1);
    }
}
