use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use craftlink_batch::{BatchController, OutboundBatch, RejectedBatch};
use craftlink_commands::executors::{
    CreateVoxelTypeExecutor, DestroyBlockExecutor, MoveToExecutor, PlaceBlockExecutor,
    UpdateVoxelTypeExecutor,
};
use craftlink_commands::{CommandDispatcher, CommandOutcome, DispatchStatus};
use craftlink_events::{BuildEventAggregator, EventBus, SessionClock};
use craftlink_protocol::{
    AgentBody, CommandPhase, ContinuePlanPayload, Endpoint, GameStateSnapshot, ImageRef,
    PhotoCapture, PlanApproval, PlanBatch, PlanObserver, SessionId, SpeechPayload, Transport,
    Vec3, VoxelTypeRegistry, WorldEditor, WorldQuery,
};
use craftlink_router::{ResponseRouter, RouteOutcome};
use craftlink_state::GameStateTracker;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use crate::config::SessionConfig;

/// A transport round-trip, delivered back to the control loop.
#[derive(Debug)]
struct TransportReply {
    session_id: SessionId,
    endpoint: Endpoint,
    result: Result<String, String>,
}

/// What one control-loop iteration did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub batch_sent: bool,
    pub routed: Vec<RouteOutcome>,
    pub outcomes: Vec<CommandOutcome>,
    pub transport_errors: Vec<String>,
}

pub struct SessionBuilder {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    session_id: Option<SessionId>,
    world_query: Option<Arc<dyn WorldQuery>>,
    world_editor: Option<Arc<dyn WorldEditor>>,
    body: Option<Arc<dyn AgentBody>>,
    capture: Option<Arc<dyn PhotoCapture>>,
    registry: Option<Arc<dyn VoxelTypeRegistry>>,
    observer: Option<Arc<dyn PlanObserver>>,
}

impl SessionBuilder {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            config: SessionConfig::default(),
            session_id: None,
            world_query: None,
            world_editor: None,
            body: None,
            capture: None,
            registry: None,
            observer: None,
        }
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn session_id(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn world(mut self, query: Arc<dyn WorldQuery>, editor: Arc<dyn WorldEditor>) -> Self {
        self.world_query = Some(query);
        self.world_editor = Some(editor);
        self
    }

    pub fn body(mut self, body: Arc<dyn AgentBody>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn capture(mut self, capture: Arc<dyn PhotoCapture>) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn registry(mut self, registry: Arc<dyn VoxelTypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn PlanObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> AgentSession {
        let bus = EventBus::new();
        let clock = SessionClock::start();
        let session_id = self.session_id.clone().unwrap_or_else(SessionId::new_uuid);

        let mut tracker = GameStateTracker::new(self.config.scan.clone(), clock);
        if let Some(world) = &self.world_query {
            tracker.attach_world(world.clone());
        }
        if let Some(registry) = &self.registry {
            tracker = tracker.with_registry(registry.clone());
        }

        let aggregator = BuildEventAggregator::new(bus.clone(), self.config.aggregator());
        let mut batch = BatchController::new(
            self.config.batch.clone(),
            bus.clone(),
            clock,
            session_id.clone(),
        );
        batch.set_capture(self.capture.clone());
        batch.add_producer(Arc::new(aggregator.clone()));

        let dispatcher = build_dispatcher(&self, &bus, &aggregator);
        info!(
            %session_id,
            executors = dispatcher.registered_types().len(),
            "agent session built"
        );

        let (replies_tx, replies_rx) = mpsc::unbounded_channel();
        AgentSession {
            config: self.config,
            bus,
            clock,
            session_id,
            tracker,
            batch,
            router: ResponseRouter::new(self.observer),
            dispatcher,
            aggregator,
            transport: self.transport,
            body: self.body,
            replies_tx,
            replies_rx,
            last_tick_at: None,
        }
    }
}

/// Registers an executor for every command whose collaborators are present.
/// Commands without one fail at dispatch time.
fn build_dispatcher(
    builder: &SessionBuilder,
    bus: &EventBus,
    aggregator: &BuildEventAggregator,
) -> CommandDispatcher {
    let mut dispatcher = CommandDispatcher::new();
    if let (Some(editor), Some(body)) = (&builder.world_editor, &builder.body) {
        if let Some(registry) = &builder.registry {
            dispatcher.register(Box::new(PlaceBlockExecutor::new(
                editor.clone(),
                body.clone(),
                registry.clone(),
                Some(aggregator.clone()),
            )));
        }
        dispatcher.register(Box::new(DestroyBlockExecutor::new(
            editor.clone(),
            body.clone(),
            Some(aggregator.clone()),
        )));
    }
    if let Some(body) = &builder.body {
        dispatcher.register(Box::new(MoveToExecutor::new(
            body.clone(),
            builder.config.movement.clone(),
        )));
    }
    if let Some(registry) = &builder.registry {
        dispatcher.register(Box::new(CreateVoxelTypeExecutor::new(
            registry.clone(),
            bus.clone(),
        )));
        dispatcher.register(Box::new(UpdateVoxelTypeExecutor::new(
            registry.clone(),
            bus.clone(),
        )));
    }
    dispatcher
}

/// One agent's conversation with the planning service.
///
/// Driven by [`AgentSession::tick`] from a single control loop. Network sends
/// run on spawned tasks and report back through a channel drained on the
/// next tick, so a tick never waits on the network.
pub struct AgentSession {
    config: SessionConfig,
    bus: EventBus,
    clock: SessionClock,
    session_id: SessionId,
    tracker: GameStateTracker,
    batch: BatchController,
    router: ResponseRouter,
    dispatcher: CommandDispatcher,
    aggregator: BuildEventAggregator,
    transport: Arc<dyn Transport>,
    body: Option<Arc<dyn AgentBody>>,
    replies_tx: mpsc::UnboundedSender<TransportReply>,
    replies_rx: mpsc::UnboundedReceiver<TransportReply>,
    last_tick_at: Option<Instant>,
}

impl AgentSession {
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bus producers publish on.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn tracker(&self) -> &GameStateTracker {
        &self.tracker
    }

    pub fn snapshot(&self) -> GameStateSnapshot {
        self.tracker.snapshot()
    }

    pub fn pending_events(&self) -> usize {
        self.batch.pending_len()
    }

    pub fn take_rejected_batch(&mut self) -> Option<RejectedBatch> {
        self.batch.take_rejected()
    }

    /// Operator chat.
    pub fn say(&self, text: impl Into<String>) {
        self.bus.publish(&SpeechPayload::new(text));
    }

    /// Ask the planner to carry on with its current plan.
    pub fn continue_plan(&self, summary: impl Into<String>, next_steps: Vec<String>) {
        self.bus
            .publish(&ContinuePlanPayload::new(summary, next_steps, Vec::<ImageRef>::new()));
    }

    pub fn request_perception(&mut self) {
        self.batch.request_perception();
    }

    pub fn update_operator_position(&mut self, operator: Vec3) {
        self.tracker.update_operator_world_position(operator);
    }

    /// Run one control-loop iteration.
    #[instrument(skip(self), fields(session_id = %self.session_id))]
    pub fn tick(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        let dt = self
            .last_tick_at
            .map(|last| now.saturating_duration_since(last))
            .unwrap_or(Duration::ZERO);
        self.last_tick_at = Some(now);

        self.dispatcher.tick(dt);
        self.record_outcomes(&mut report);
        self.drain_replies(&mut report);
        self.record_outcomes(&mut report);

        if let Some(body) = &self.body {
            self.tracker.update_agent_position(body.pose().position);
        }
        self.tracker.tick(now);
        self.aggregator.flush_if_quiet(now);

        if let Some(outbound) = self.batch.evaluate(now, &mut self.tracker) {
            match self.send_batch(outbound) {
                Ok(()) => report.batch_sent = true,
                Err(error) => {
                    warn!(error = %format!("{error:#}"), "batch dropped");
                    report.transport_errors.push(format!("{error:#}"));
                }
            }
        }
        report
    }

    /// Hand a sealed batch to the transport. The batch is not retried.
    pub fn send_batch(&self, outbound: OutboundBatch) -> Result<()> {
        info!(events = outbound.batch.len(), "sending batch");
        self.spawn_send(Endpoint::Events, outbound.body)
    }

    /// Ask the planner for permission to carry out `plan`.
    #[instrument(skip(self, plan), fields(goal_id = %plan.goal_id))]
    pub fn send_plan_approval(&mut self, plan: &PlanBatch) -> Result<()> {
        if plan.plan.is_empty() {
            bail!("plan {} has no items to approve", plan.goal_id);
        }
        let approval = PlanApproval {
            goal_id: plan.goal_id.clone(),
            goal_label: plan.goal_label.clone(),
            session_id: self.session_id.clone(),
            plan: plan.plan.clone(),
        };
        self.router.record_plan_approval(&approval);
        let body = serde_json::to_string(&approval).context("failed encoding plan approval")?;
        self.spawn_send(Endpoint::PlanPermission, body)
    }

    fn spawn_send(&self, endpoint: Endpoint, body: String) -> Result<()> {
        let handle = Handle::try_current().context("no async runtime to send on")?;
        let transport = self.transport.clone();
        let replies = self.replies_tx.clone();
        let session_id = self.session_id.clone();
        handle.spawn(async move {
            let result = transport
                .send(endpoint, body)
                .await
                .map_err(|error| error.to_string());
            let _ = replies.send(TransportReply {
                session_id,
                endpoint,
                result,
            });
        });
        Ok(())
    }

    fn drain_replies(&mut self, report: &mut TickReport) {
        while let Ok(reply) = self.replies_rx.try_recv() {
            if reply.session_id != self.session_id {
                debug!(stale = %reply.session_id, "reply for a previous session ignored");
                continue;
            }
            let text = match reply.result {
                Ok(text) => text,
                Err(error) => {
                    warn!(endpoint = reply.endpoint.path(), %error, "transport failed");
                    report.transport_errors.push(error);
                    continue;
                }
            };
            let outcome = self.router.route(&text, &mut self.tracker);
            if let RouteOutcome::Commands(batch) = &outcome {
                for dispatched in self.dispatcher.dispatch(batch) {
                    if dispatched.status == DispatchStatus::Started {
                        self.tracker.update_last_command_phase(
                            &dispatched.command_id,
                            CommandPhase::Executing,
                        );
                    }
                }
            }
            report.routed.push(outcome);
        }
    }

    fn record_outcomes(&mut self, report: &mut TickReport) {
        for outcome in self.dispatcher.drain_outcomes() {
            let phase = outcome.phase();
            match &outcome.result {
                Ok(summary) => info!(command_id = %outcome.command_id, %summary, "command completed"),
                Err(failure) => {
                    warn!(command_id = %outcome.command_id, %failure, %phase, "command did not complete")
                }
            }
            if !self
                .tracker
                .update_last_command_phase(&outcome.command_id, phase)
            {
                debug!(command_id = %outcome.command_id, "command no longer tracked");
            }
            report.outcomes.push(outcome);
        }
    }

    /// Start a new session: cancel running commands, forget all state and
    /// subscriptions, and take a fresh session id.
    #[instrument(skip(self), fields(previous = %self.session_id))]
    pub fn reset(&mut self) {
        self.dispatcher.interrupt_all();
        self.dispatcher.tick(Duration::ZERO);
        let dropped = self.dispatcher.drain_outcomes().len();

        self.bus.clear();
        self.aggregator.discard();
        self.router.reset();
        self.tracker.reset();
        while self.replies_rx.try_recv().is_ok() {}

        self.clock = SessionClock::start();
        self.session_id = SessionId::new_uuid();
        self.tracker.set_clock(self.clock);
        self.batch.reset(self.session_id.clone(), self.clock);
        self.last_tick_at = None;
        info!(session_id = %self.session_id, dropped, "session reset");
    }
}
