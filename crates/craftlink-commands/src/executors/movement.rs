use std::sync::Arc;
use std::time::Duration;

use craftlink_protocol::{AgentBody, CommandId, Vec3};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::{CommandExecutor, CommandFailure, CommandType, Completion, TargetParams, parse_params};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveConfig {
    /// Cells per second.
    pub speed: f32,
    /// Arrival radius, in cells.
    pub tolerance: f32,
    pub timeout_secs: f32,
}

impl Default for MoveConfig {
    fn default() -> Self {
        Self {
            speed: 4.0,
            tolerance: 0.1,
            timeout_secs: 15.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MoveParams {
    #[serde(flatten)]
    target: TargetParams,
    #[serde(default)]
    speed: Option<f32>,
    #[serde(default)]
    tolerance: Option<f32>,
    #[serde(default)]
    timeout_secs: Option<f32>,
}

struct ActiveMove {
    target: Vec3,
    speed: f32,
    tolerance: f32,
    timeout: Duration,
    elapsed: Duration,
    completion: Completion,
}

enum Progress {
    Running,
    Arrived,
    TimedOut(Duration),
}

/// Walks the agent toward the last cell of the target expansion, one tick
/// at a time.
pub struct MoveToExecutor {
    body: Arc<dyn AgentBody>,
    config: MoveConfig,
    active: Option<ActiveMove>,
    interrupt_requested: bool,
}

impl MoveToExecutor {
    pub fn new(body: Arc<dyn AgentBody>, config: MoveConfig) -> Self {
        Self {
            body,
            config,
            active: None,
            interrupt_requested: false,
        }
    }

    fn plan(&self, params: &str) -> Result<(Vec3, f32, f32, Duration), CommandFailure> {
        let params: MoveParams = parse_params(params)?;
        let pose = self.body.pose();
        let cells = params.target.resolve(&pose)?;
        let Some(cell) = cells.last() else {
            return Err(CommandFailure::MalformedParams("no target cell".to_owned()));
        };
        // Keep the agent's offset within its cell so it lands where it would
        // stand in the target cell.
        let within_cell = pose.position - pose.position.cell().as_vec3();
        let target = cell.as_vec3() + within_cell;

        let speed = params.speed.unwrap_or(self.config.speed);
        let tolerance = params.tolerance.unwrap_or(self.config.tolerance).max(0.0);
        let timeout_secs = params.timeout_secs.unwrap_or(self.config.timeout_secs);
        if !(speed.is_finite() && speed > 0.0) {
            return Err(CommandFailure::MalformedParams(format!(
                "speed must be positive, got {speed}"
            )));
        }
        let timeout = Duration::try_from_secs_f32(timeout_secs).map_err(|_| {
            CommandFailure::MalformedParams(format!("invalid timeout {timeout_secs}"))
        })?;
        Ok((target, speed, tolerance, timeout))
    }

    fn finish_interrupted(&mut self) {
        self.interrupt_requested = false;
        if let Some(active) = self.active.take() {
            info!(command_id = %active.completion.command_id(), "move interrupted");
            active.completion.fail(CommandFailure::Interrupted);
        }
    }

    fn advance(&mut self, dt: Duration) -> Progress {
        let Some(active) = self.active.as_mut() else {
            return Progress::Running;
        };
        let position = self.body.pose().position;
        let delta = active.target - position;
        let distance = delta.length();
        if distance <= active.tolerance {
            return Progress::Arrived;
        }

        active.elapsed += dt;
        if active.elapsed >= active.timeout {
            return Progress::TimedOut(active.timeout);
        }

        let step = active.speed * dt.as_secs_f32();
        let next = if step >= distance {
            active.target
        } else {
            position + delta * (step / distance)
        };
        self.body.set_position(next);

        if self.body.pose().position.distance(active.target) <= active.tolerance {
            Progress::Arrived
        } else {
            Progress::Running
        }
    }
}

impl CommandExecutor for MoveToExecutor {
    fn command_type(&self) -> CommandType {
        CommandType::MoveTo
    }

    #[instrument(skip(self, params, completion), fields(command = "move_to"))]
    fn execute(&mut self, command_id: &CommandId, params: &str, completion: Completion) {
        if self.interrupt_requested {
            self.finish_interrupted();
        }
        if self.active.is_some() {
            completion.fail(CommandFailure::Busy(CommandType::MoveTo));
            return;
        }
        let (target, speed, tolerance, timeout) = match self.plan(params) {
            Ok(plan) => plan,
            Err(failure) => {
                completion.fail(failure);
                return;
            }
        };
        if self.body.pose().position.distance(target) <= tolerance {
            completion.complete("already there");
            return;
        }
        debug!(?target, speed, "move started");
        self.interrupt_requested = false;
        self.active = Some(ActiveMove {
            target,
            speed,
            tolerance,
            timeout,
            elapsed: Duration::ZERO,
            completion,
        });
    }

    fn interrupt(&mut self) {
        if self.active.is_some() {
            self.interrupt_requested = true;
        }
    }

    fn can_interrupt(&self) -> bool {
        true
    }

    /// An interrupted move no longer counts; it is retired on the next
    /// tick or the next `execute`, whichever comes first.
    fn is_busy(&self) -> bool {
        self.active.is_some() && !self.interrupt_requested
    }

    fn tick(&mut self, dt: Duration) {
        if self.active.is_none() {
            return;
        }
        if self.interrupt_requested {
            self.finish_interrupted();
            return;
        }
        match self.advance(dt) {
            Progress::Running => {}
            Progress::Arrived => {
                if let Some(active) = self.active.take() {
                    active.completion.complete(format!(
                        "arrived at ({:.1}, {:.1}, {:.1})",
                        active.target.x, active.target.y, active.target.z
                    ));
                }
            }
            Progress::TimedOut(after) => {
                if let Some(active) = self.active.take() {
                    active.completion.fail(CommandFailure::Timeout(after));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CommandOutcome, OutcomeReceiver};
    use craftlink_protocol::CommandPhase;
    use craftlink_world::SimulatedBody;

    fn start(
        executor: &mut MoveToExecutor,
        id: &str,
        params: &str,
    ) -> OutcomeReceiver {
        let (completion, receiver) =
            Completion::channel(CommandId::from_string(id), CommandType::MoveTo);
        executor.execute(&CommandId::from_string(id), params, completion);
        receiver
    }

    fn next(receiver: &mut OutcomeReceiver) -> Option<CommandOutcome> {
        receiver.try_recv().ok()
    }

    #[test]
    fn walks_to_last_expanded_cell() {
        let body = Arc::new(SimulatedBody::at(Vec3::new(0.5, 0.0, 0.5)));
        let mut executor = MoveToExecutor::new(body.clone(), MoveConfig::default());
        let mut receiver = start(
            &mut executor,
            "c1",
            r#"{"expand_direction":"forward","count":3}"#,
        );
        assert!(executor.is_busy());

        executor.tick(Duration::from_millis(250));
        assert!(next(&mut receiver).is_none());
        executor.tick(Duration::from_millis(250));

        let outcome = next(&mut receiver).expect("arrived");
        assert_eq!(outcome.phase(), CommandPhase::Completed);
        assert_eq!(body.position(), Vec3::new(0.5, 0.0, 2.5));
        assert!(!executor.is_busy());
    }

    #[test]
    fn second_move_while_busy_is_rejected() {
        let body = Arc::new(SimulatedBody::at(Vec3::ZERO));
        let mut executor = MoveToExecutor::new(body, MoveConfig::default());
        let _first = start(&mut executor, "c1", r#"{"expand_direction":"up","count":5}"#);
        let mut second = start(&mut executor, "c2", r#"{"expand_direction":"up","count":5}"#);
        assert_eq!(
            next(&mut second).map(|o| o.result),
            Some(Err(CommandFailure::Busy(CommandType::MoveTo)))
        );
    }

    #[test]
    fn stuck_body_times_out() {
        let body = Arc::new(SimulatedBody::at(Vec3::ZERO));
        body.set_frozen(true);
        let mut executor = MoveToExecutor::new(body, MoveConfig::default());
        let mut receiver = start(
            &mut executor,
            "c1",
            r#"{"expand_direction":"right","count":4,"timeout_secs":1.0}"#,
        );
        executor.tick(Duration::from_millis(600));
        assert!(next(&mut receiver).is_none());
        executor.tick(Duration::from_millis(600));
        assert_eq!(
            next(&mut receiver).map(|o| o.result),
            Some(Err(CommandFailure::Timeout(Duration::from_secs(1))))
        );
    }

    #[test]
    fn interrupt_fails_in_flight_move_on_next_tick() {
        let body = Arc::new(SimulatedBody::at(Vec3::ZERO));
        let mut executor = MoveToExecutor::new(body, MoveConfig::default());
        let mut receiver = start(&mut executor, "c1", r#"{"expand_direction":"back","count":6}"#);

        executor.interrupt();
        assert!(next(&mut receiver).is_none());
        executor.tick(Duration::from_millis(16));
        assert_eq!(
            next(&mut receiver).map(|o| o.phase()),
            Some(CommandPhase::Interrupted)
        );
        assert!(!executor.is_busy());
    }

    #[test]
    fn interrupted_executor_accepts_next_move_at_once() {
        let body = Arc::new(SimulatedBody::at(Vec3::new(0.5, 0.0, 0.5)));
        let mut executor = MoveToExecutor::new(body.clone(), MoveConfig::default());
        let mut first = start(&mut executor, "c1", r#"{"expand_direction":"back","count":6}"#);

        executor.interrupt();
        assert!(!executor.is_busy());
        let mut second = start(
            &mut executor,
            "c2",
            r#"{"expand_direction":"forward","count":2}"#,
        );
        assert_eq!(
            next(&mut first).map(|o| o.phase()),
            Some(CommandPhase::Interrupted)
        );
        assert!(next(&mut second).is_none());
        assert!(executor.is_busy());

        executor.tick(Duration::from_millis(250));
        assert_eq!(
            next(&mut second).map(|o| o.phase()),
            Some(CommandPhase::Completed)
        );
        assert_eq!(body.position(), Vec3::new(0.5, 0.0, 1.5));
    }

    #[test]
    fn invalid_direction_fails_immediately() {
        let body = Arc::new(SimulatedBody::at(Vec3::ZERO));
        let mut executor = MoveToExecutor::new(body, MoveConfig::default());
        let mut receiver = start(&mut executor, "c1", r#"{"expand_direction":"diagonal"}"#);
        assert!(matches!(
            next(&mut receiver).map(|o| o.result),
            Some(Err(CommandFailure::InvalidDirection(_)))
        ));
        assert!(!executor.is_busy());
    }
}
