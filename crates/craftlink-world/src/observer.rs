use craftlink_protocol::{PlanBatch, PlanObserver};
use parking_lot::Mutex;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservedItem {
    Plan(PlanBatch),
    Message(String),
    TextReply(String),
}

/// Headless operator UI: logs and remembers everything it is shown.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    items: Mutex<Vec<ObservedItem>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn items(&self) -> Vec<ObservedItem> {
        self.items.lock().clone()
    }

    pub fn plans(&self) -> Vec<PlanBatch> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| match item {
                ObservedItem::Plan(plan) => Some(plan.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.items
            .lock()
            .iter()
            .filter_map(|item| match item {
                ObservedItem::Message(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PlanObserver for RecordingObserver {
    fn show_plan(&self, plan: &PlanBatch) {
        info!(goal_id = %plan.goal_id, goal = %plan.goal_label, items = plan.plan.len(), "plan awaiting approval");
        self.items.lock().push(ObservedItem::Plan(plan.clone()));
    }

    fn show_message(&self, message: &str) {
        info!(%message, "planner says");
        self.items.lock().push(ObservedItem::Message(message.to_owned()));
    }

    fn show_text_reply(&self, text: &str) {
        info!(%text, "planner replied with text");
        self.items.lock().push(ObservedItem::TextReply(text.to_owned()));
    }
}
