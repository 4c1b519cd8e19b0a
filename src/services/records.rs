use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use serde::Serialize;

use crate::core::time;
use crate::services::feedback::FeedbackResult;

#[derive(Debug, Clone, Serialize)]
pub(crate) struct GradedRecord {
    pub(crate) submission_id: String,
    pub(crate) code: String,
    pub(crate) feedback: String,
    pub(crate) errors: BTreeMap<usize, String>,
    pub(crate) graded_at: String,
}

impl GradedRecord {
    pub(crate) fn new(code: &str, result: &FeedbackResult) -> Self {
        Self {
            submission_id: result.submission_id.clone(),
            code: code.to_string(),
            feedback: result.feedback.clone(),
            errors: result.errors.clone(),
            graded_at: time::format_offset(time::now_utc()),
        }
    }
}

/// Process-wide, append-only record of graded submissions keyed by student
/// (`name-email`). Lives for the lifetime of the process.
#[derive(Debug, Default)]
pub(crate) struct GradedLog {
    entries: Mutex<HashMap<String, Vec<GradedRecord>>>,
}

impl GradedLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn append(&self, key: &str, record: GradedRecord) {
        let mut entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.entry(key.to_string()).or_default().push(record);
    }

    /// Copy of the log with keys in sorted order.
    pub(crate) fn snapshot(&self) -> BTreeMap<String, Vec<GradedRecord>> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.iter().map(|(key, records)| (key.clone(), records.clone())).collect()
    }

    pub(crate) fn records_for(&self, key: &str) -> Vec<GradedRecord> {
        let entries = self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        entries.get(key).cloned().unwrap_or_default()
    }
}
