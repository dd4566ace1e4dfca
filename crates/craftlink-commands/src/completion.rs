use std::time::Duration;

use craftlink_protocol::{CommandId, CommandPhase};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

use crate::CommandType;

/// Why a command did not complete successfully.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandFailure {
    #[error("executor for {0} is busy")]
    Busy(CommandType),
    #[error("malformed params: {0}")]
    MalformedParams(String),
    #[error("invalid direction: {0}")]
    InvalidDirection(String),
    #[error("unknown voxel type: {0}")]
    UnknownVoxelType(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("interrupted")]
    Interrupted,
    #[error("world error: {0}")]
    World(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("no executor registered for {0}")]
    NoExecutor(CommandType),
    #[error("executor dropped the command without reporting")]
    Abandoned,
}

impl CommandFailure {
    pub fn phase(&self) -> CommandPhase {
        match self {
            Self::Interrupted => CommandPhase::Interrupted,
            _ => CommandPhase::Failed,
        }
    }
}

/// Final report for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command_id: CommandId,
    pub command_type: CommandType,
    /// Short human-readable summary on success.
    pub result: Result<String, CommandFailure>,
}

impl CommandOutcome {
    pub fn phase(&self) -> CommandPhase {
        match &self.result {
            Ok(_) => CommandPhase::Completed,
            Err(failure) => failure.phase(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

pub type OutcomeSender = mpsc::UnboundedSender<CommandOutcome>;
pub type OutcomeReceiver = mpsc::UnboundedReceiver<CommandOutcome>;

/// One-shot completion handle for a single command.
///
/// Consumed by [`Completion::complete`] or [`Completion::fail`]. A handle
/// dropped without either reports [`CommandFailure::Abandoned`], so every
/// dispatched command produces exactly one outcome.
#[derive(Debug)]
pub struct Completion {
    command_id: CommandId,
    command_type: CommandType,
    sender: Option<OutcomeSender>,
}

impl Completion {
    pub fn new(command_id: CommandId, command_type: CommandType, sender: OutcomeSender) -> Self {
        Self {
            command_id,
            command_type,
            sender: Some(sender),
        }
    }

    /// A completion wired to its own channel, for driving an executor
    /// directly.
    pub fn channel(command_id: CommandId, command_type: CommandType) -> (Self, OutcomeReceiver) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(command_id, command_type, sender), receiver)
    }

    pub fn command_id(&self) -> &CommandId {
        &self.command_id
    }

    pub fn command_type(&self) -> CommandType {
        self.command_type
    }

    pub fn complete(mut self, summary: impl Into<String>) {
        self.fire(Ok(summary.into()));
    }

    pub fn fail(mut self, failure: CommandFailure) {
        self.fire(Err(failure));
    }

    fn fire(&mut self, result: Result<String, CommandFailure>) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        let outcome = CommandOutcome {
            command_id: self.command_id.clone(),
            command_type: self.command_type,
            result,
        };
        if sender.send(outcome).is_err() {
            warn!(command_id = %self.command_id, "outcome receiver closed");
        }
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if self.sender.is_some() {
            warn!(command_id = %self.command_id, "completion dropped unfired");
            self.fire(Err(CommandFailure::Abandoned));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(receiver: &mut OutcomeReceiver) -> Vec<CommandOutcome> {
        std::iter::from_fn(|| receiver.try_recv().ok()).collect()
    }

    #[test]
    fn complete_reports_once() {
        let (completion, mut receiver) =
            Completion::channel(CommandId::from_string("c1"), CommandType::MoveTo);
        completion.complete("arrived");
        let outcomes = drain(&mut receiver);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].phase(), CommandPhase::Completed);
    }

    #[test]
    fn dropped_completion_reports_abandoned() {
        let (completion, mut receiver) =
            Completion::channel(CommandId::from_string("c1"), CommandType::PlaceBlock);
        drop(completion);
        let outcomes = drain(&mut receiver);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].result, Err(CommandFailure::Abandoned));
        assert_eq!(outcomes[0].phase(), CommandPhase::Failed);
    }

    #[test]
    fn interruption_maps_to_interrupted_phase() {
        let (completion, mut receiver) =
            Completion::channel(CommandId::from_string("c1"), CommandType::MoveTo);
        completion.fail(CommandFailure::Interrupted);
        assert_eq!(drain(&mut receiver)[0].phase(), CommandPhase::Interrupted);
    }
}
