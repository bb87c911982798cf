//! Fixed-shape progress record.
//!
//! Every field is always populated so observers never have to guess whether a
//! missing label means "not started" or "lost".

use serde::{Deserialize, Serialize};

const NOT_STARTED: &str = "not started";
const NO_PROVIDER: &str = "none";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionProgress {
    pub current_item_label: String,
    pub current_provider_label: String,
    pub completed: u32,
    pub total: u32,
}

impl CollectionProgress {
    /// Progress at the start of a run of `total` units.
    pub fn starting(total: u32) -> Self {
        Self {
            current_item_label: NOT_STARTED.to_string(),
            current_provider_label: NO_PROVIDER.to_string(),
            completed: 0,
            total,
        }
    }

    /// Record that the unit at `completed - 1` has been handled.
    ///
    /// The counter never moves backwards and never passes `total`.
    pub fn record(&mut self, completed: u32, item_label: &str, provider_label: &str) {
        self.completed = completed.max(self.completed).min(self.total);
        self.current_item_label = item_label.to_string();
        self.current_provider_label = provider_label.to_string();
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }

    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.completed)
    }

    /// Whole-number percentage; an empty run counts as done.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((u64::from(self.completed) * 100) / u64::from(self.total)) as u8
    }

    pub fn fraction_label(&self) -> String {
        format!("{}/{}", self.completed, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_progress_is_fully_populated() {
        let progress = CollectionProgress::starting(20);
        assert!(!progress.current_item_label.is_empty());
        assert!(!progress.current_provider_label.is_empty());
        assert_eq!(progress.completed, 0);
        assert_eq!(progress.total, 20);
    }

    #[test]
    fn record_is_monotonic_and_capped() {
        let mut progress = CollectionProgress::starting(4);
        progress.record(3, "Prompt 2", "claude");
        progress.record(2, "Prompt 1", "chatgpt");
        assert_eq!(progress.completed, 3);
        assert_eq!(progress.current_provider_label, "chatgpt");

        progress.record(9, "Prompt 4", "gemini");
        assert_eq!(progress.completed, 4);
        assert!(progress.is_finished());
    }

    #[test]
    fn percent_handles_empty_runs() {
        assert_eq!(CollectionProgress::starting(0).percent(), 100);

        let mut progress = CollectionProgress::starting(20);
        progress.record(7, "Prompt 4", "claude");
        assert_eq!(progress.percent(), 35);
        assert_eq!(progress.remaining(), 13);
        assert_eq!(progress.fraction_label(), "7/20");
    }

    #[test]
    fn serializes_with_camel_case_keys() {
        let json = serde_json::to_value(CollectionProgress::starting(2)).unwrap();
        assert!(json.get("currentItemLabel").is_some());
        assert!(json.get("currentProviderLabel").is_some());
    }
}
