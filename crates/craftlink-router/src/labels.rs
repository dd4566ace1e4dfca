use std::collections::HashMap;

use craftlink_protocol::GoalId;

/// Human-readable goal labels keyed by goal id, remembered across replies so
/// that commands arriving without a label can still be shown with one.
#[derive(Debug, Default, Clone)]
pub struct GoalLabelStore {
    labels: HashMap<GoalId, String>,
}

impl GoalLabelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blank labels and goal ids are ignored.
    pub fn remember(&mut self, goal_id: &GoalId, label: &str) -> bool {
        let label = label.trim();
        if goal_id.is_empty() || label.is_empty() {
            return false;
        }
        self.labels.insert(goal_id.clone(), label.to_owned());
        true
    }

    pub fn label(&self, goal_id: &GoalId) -> Option<&str> {
        self.labels.get(goal_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn clear(&mut self) {
        self.labels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_entries_are_not_stored() {
        let mut store = GoalLabelStore::new();
        assert!(!store.remember(&GoalId::from_string("g1"), "  "));
        assert!(!store.remember(&GoalId::default(), "hut"));
        assert!(store.remember(&GoalId::from_string("g1"), " hut "));
        assert_eq!(store.label(&GoalId::from_string("g1")), Some("hut"));
        store.clear();
        assert!(store.is_empty());
    }
}
