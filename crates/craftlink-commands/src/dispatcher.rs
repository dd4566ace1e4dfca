use std::time::Duration;

use craftlink_protocol::{CommandBatch, CommandId};
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    CommandExecutor, CommandFailure, CommandOutcome, CommandType, Completion, OutcomeReceiver,
    OutcomeSender,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    /// Handed to its executor; the outcome arrives through
    /// [`CommandDispatcher::drain_outcomes`].
    Started,
    /// The type string names no known command.
    Skipped,
    /// Refused before reaching an executor. An outcome is also queued.
    Rejected(CommandFailure),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub command_id: CommandId,
    pub command_type: String,
    pub status: DispatchStatus,
}

/// Routes commands to their executors and collects outcomes.
pub struct CommandDispatcher {
    executors: IndexMap<CommandType, Box<dyn CommandExecutor>>,
    sender: OutcomeSender,
    receiver: OutcomeReceiver,
}

impl Default for CommandDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandDispatcher {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            executors: IndexMap::new(),
            sender,
            receiver,
        }
    }

    /// Register `executor` under its own type, returning any executor it
    /// replaces.
    pub fn register(
        &mut self,
        executor: Box<dyn CommandExecutor>,
    ) -> Option<Box<dyn CommandExecutor>> {
        self.executors.insert(executor.command_type(), executor)
    }

    pub fn with_executor(mut self, executor: Box<dyn CommandExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn registered_types(&self) -> Vec<CommandType> {
        self.executors.keys().copied().collect()
    }

    pub fn is_busy(&self, command_type: CommandType) -> bool {
        self.executors
            .get(&command_type)
            .is_some_and(|executor| executor.is_busy())
    }

    /// Dispatch every command in order. A failure never stops the rest.
    pub fn dispatch(&mut self, batch: &CommandBatch) -> Vec<DispatchReport> {
        let span = tracing::info_span!(
            "commands.dispatch",
            goal_id = %batch.goal_id,
            commands = batch.commands.len()
        );
        let _enter = span.enter();

        batch
            .commands
            .iter()
            .map(|command| {
                let status = match CommandType::parse(&command.command_type) {
                    Some(command_type) => self.dispatch_one(command_type, &command.id, &command.params),
                    None => {
                        warn!(
                            command_id = %command.id,
                            command_type = %command.command_type,
                            "unknown command type; skipped"
                        );
                        DispatchStatus::Skipped
                    }
                };
                DispatchReport {
                    command_id: command.id.clone(),
                    command_type: command.command_type.clone(),
                    status,
                }
            })
            .collect()
    }

    /// Dispatch one command of a known type.
    pub fn dispatch_one(
        &mut self,
        command_type: CommandType,
        command_id: &CommandId,
        params: &str,
    ) -> DispatchStatus {
        let completion = Completion::new(command_id.clone(), command_type, self.sender.clone());
        let Some(executor) = self.executors.get_mut(&command_type) else {
            warn!(%command_id, %command_type, "no executor registered");
            let failure = CommandFailure::NoExecutor(command_type);
            completion.fail(failure.clone());
            return DispatchStatus::Rejected(failure);
        };
        if executor.is_busy() {
            debug!(%command_id, %command_type, "executor busy; rejected");
            let failure = CommandFailure::Busy(command_type);
            completion.fail(failure.clone());
            return DispatchStatus::Rejected(failure);
        }
        debug!(%command_id, %command_type, "executing");
        executor.execute(command_id, params, completion);
        DispatchStatus::Started
    }

    /// Request cancellation of `command_type`'s in-flight command.
    pub fn interrupt(&mut self, command_type: CommandType) -> bool {
        match self.executors.get_mut(&command_type) {
            Some(executor) if executor.can_interrupt() && executor.is_busy() => {
                info!(%command_type, "interrupt requested");
                executor.interrupt();
                true
            }
            _ => false,
        }
    }

    pub fn interrupt_all(&mut self) -> usize {
        CommandType::ALL
            .into_iter()
            .filter(|ty| self.interrupt(*ty))
            .count()
    }

    pub fn tick(&mut self, dt: Duration) {
        for executor in self.executors.values_mut() {
            executor.tick(dt);
        }
    }

    /// Outcomes reported since the last drain, in report order.
    pub fn drain_outcomes(&mut self) -> Vec<CommandOutcome> {
        std::iter::from_fn(|| self.receiver.try_recv().ok()).collect()
    }
}
