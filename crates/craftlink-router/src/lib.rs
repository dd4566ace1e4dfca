//! Routing of planning-service replies.
//!
//! Replies are untagged. A reply is tried as a [`PlanBatch`] first, then as a
//! [`CommandBatch`]; the first shape that parses wins and anything else is
//! shown to the operator as plain text.

mod labels;

pub use labels::GoalLabelStore;

use std::sync::Arc;

use craftlink_protocol::{
    CommandBatch, CommandPhase, GoalId, LastCommandEntry, PlanApproval, PlanBatch, PlanItemId,
    PlanObserver,
};
use craftlink_state::GameStateTracker;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

/// What a reply turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// A plan with no items; only its message (if any) was shown.
    EmptyPlan { goal_id: GoalId },
    /// A plan awaiting approval.
    Plan(PlanBatch),
    /// Commands to dispatch, with goal ids and labels resolved.
    Commands(CommandBatch),
    /// Neither shape; shown as text.
    Text(String),
}

pub struct ResponseRouter {
    labels: GoalLabelStore,
    observer: Option<Arc<dyn PlanObserver>>,
}

impl ResponseRouter {
    pub fn new(observer: Option<Arc<dyn PlanObserver>>) -> Self {
        Self {
            labels: GoalLabelStore::new(),
            observer,
        }
    }

    pub fn labels(&self) -> &GoalLabelStore {
        &self.labels
    }

    /// Remember the label of a plan the operator approved.
    pub fn record_plan_approval(&mut self, approval: &PlanApproval) {
        self.labels.remember(&approval.goal_id, &approval.goal_label);
    }

    #[instrument(skip(self, reply, tracker), fields(bytes = reply.len()))]
    pub fn route(&mut self, reply: &str, tracker: &mut GameStateTracker) -> RouteOutcome {
        let value = serde_json::from_str::<Value>(reply).ok().map(trim_keys);

        if let Some(plan) = value.as_ref().and_then(parse_plan) {
            return self.route_plan(plan, tracker);
        }
        if let Some(batch) = value.as_ref().and_then(parse_commands) {
            return RouteOutcome::Commands(self.route_commands(batch, tracker));
        }

        debug!("reply is neither a plan nor a command batch");
        if let Some(observer) = &self.observer {
            observer.show_text_reply(reply);
        }
        RouteOutcome::Text(reply.to_owned())
    }

    fn route_plan(&mut self, plan: PlanBatch, tracker: &mut GameStateTracker) -> RouteOutcome {
        let message = plan
            .talk_to_player
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty());

        if plan.plan.is_empty() {
            info!(goal_id = %plan.goal_id, "planner proposed nothing");
            if let (Some(observer), Some(message)) = (&self.observer, message) {
                observer.show_message(message);
            }
            return RouteOutcome::EmptyPlan {
                goal_id: plan.goal_id,
            };
        }

        info!(
            goal_id = %plan.goal_id,
            goal = %plan.goal_label,
            items = plan.plan.len(),
            "plan received"
        );
        for entry in plan.pending_entries() {
            tracker.add_pending_plan(entry);
        }
        self.labels.remember(&plan.goal_id, &plan.goal_label);
        match &self.observer {
            Some(observer) => {
                if let Some(message) = message {
                    observer.show_message(message);
                }
                observer.show_plan(&plan);
            }
            None => warn!("no plan observer attached; plan cannot be approved"),
        }
        RouteOutcome::Plan(plan)
    }

    fn route_commands(
        &mut self,
        mut batch: CommandBatch,
        tracker: &mut GameStateTracker,
    ) -> CommandBatch {
        if let Some(label) = batch.goal_label.as_deref() {
            self.labels.remember(&batch.goal_id, label);
        }
        let batch_label = non_blank(batch.goal_label.as_deref()).map(str::to_owned);

        for command in &mut batch.commands {
            let goal_id = command
                .goal_id
                .clone()
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| batch.goal_id.clone());
            let goal_label = non_blank(command.goal_label.as_deref())
                .map(str::to_owned)
                .or_else(|| batch_label.clone())
                .or_else(|| self.labels.label(&goal_id).map(str::to_owned))
                .unwrap_or_default();

            tracker.add_last_command(LastCommandEntry {
                id: command.id.clone(),
                goal_id: goal_id.clone(),
                goal_label: goal_label.clone(),
                command_type: command.command_type.clone(),
                params: command.params.clone(),
                phase: command.phase.unwrap_or(CommandPhase::Pending),
            });
            tracker.remove_pending_plan(&PlanItemId::from_string(command.id.as_str()));

            command.goal_id = Some(goal_id);
            command.goal_label = Some(goal_label);
        }

        info!(
            goal_id = %batch.goal_id,
            commands = batch.commands.len(),
            "command batch received"
        );
        batch
    }

    /// Forget every goal label, for a new session.
    pub fn reset(&mut self) {
        self.labels.clear();
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|text| !text.is_empty())
}

/// Strip surrounding whitespace from every object key, at any depth.
fn trim_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key.trim().to_owned(), trim_keys(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(trim_keys).collect()),
        other => other,
    }
}

fn parse_plan(value: &Value) -> Option<PlanBatch> {
    let object = value.as_object()?;
    if !object.get("plan").is_some_and(Value::is_array) {
        return None;
    }
    serde_json::from_value::<PlanBatch>(value.clone())
        .ok()
        .filter(|plan| !plan.goal_id.is_empty() && !plan.session_id.is_empty())
}

fn parse_commands(value: &Value) -> Option<CommandBatch> {
    let object = value.as_object()?;
    if !object.get("commands").is_some_and(Value::is_array) {
        return None;
    }
    serde_json::from_value::<CommandBatch>(value.clone())
        .ok()
        .filter(|batch| {
            !batch.goal_id.is_empty() && !batch.session_id.is_empty() && !batch.commands.is_empty()
        })
}
