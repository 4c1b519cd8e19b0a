use std::collections::BTreeSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::grading::GradingError;
use crate::services::prompt;
use crate::services::store::{sanitized_filename, Submission, SubmissionStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum Direction {
    Next,
    Prev,
}

/// A named file as received from a front end, before sanitization.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UploadedFile {
    pub(crate) filename: String,
    pub(crate) content: String,
}

/// Everything one grading pass needs, detached from the session lock.
#[derive(Debug, Clone)]
pub(crate) struct GradingJob {
    pub(crate) submission: Submission,
    pub(crate) prompt: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct SessionSnapshot {
    pub(crate) session_id: Uuid,
    pub(crate) assignment: String,
    pub(crate) focus: Option<String>,
    pub(crate) submission_ids: Vec<String>,
    pub(crate) cursor: Option<usize>,
    pub(crate) current_id: Option<String>,
    pub(crate) total: usize,
    pub(crate) grading_in_progress: bool,
}

/// Batch, cursor and in-flight flag for one user. Empty until the first upload.
#[derive(Debug)]
pub(crate) struct GradingSession {
    id: Uuid,
    assignment: String,
    focus: Option<String>,
    order: Vec<String>,
    cursor: usize,
    store: SubmissionStore,
    grading: bool,
}

impl GradingSession {
    pub(crate) fn new(id: Uuid, dir: PathBuf) -> Self {
        Self {
            id,
            assignment: String::new(),
            focus: None,
            order: Vec::new(),
            cursor: 0,
            store: SubmissionStore::new(dir),
            grading: false,
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    /// Replaces the whole batch. Input is validated before anything is discarded.
    pub(crate) fn start(
        &mut self,
        assignment: &str,
        focus: Option<&str>,
        files: Vec<UploadedFile>,
    ) -> Result<(), GradingError> {
        if self.grading {
            return Err(GradingError::BatchInProgress);
        }
        if assignment.trim().is_empty() {
            return Err(GradingError::Validation("assignment description is required".to_string()));
        }
        if files.is_empty() {
            return Err(GradingError::Validation(
                "at least one submission file is required".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        let mut submissions = Vec::with_capacity(files.len());
        for file in files {
            let id = sanitized_filename(&file.filename);
            if !seen.insert(id.clone()) {
                return Err(GradingError::Validation(format!(
                    "duplicate submission name '{id}' after sanitizing '{}'",
                    file.filename
                )));
            }
            submissions.push(Submission::new(id, file.content));
        }

        if let Err(err) = self.store.replace(submissions) {
            // A failed swap may still have dropped the old batch.
            if self.store.len() == 0 {
                self.order.clear();
                self.cursor = 0;
            }
            return Err(err.into());
        }

        self.cursor = 0;
        self.order = self.store.ids();
        self.assignment = assignment.trim().to_string();
        self.focus = focus.map(str::trim).filter(|focus| !focus.is_empty()).map(str::to_string);

        tracing::info!(
            session_id = %self.id,
            submissions = self.store.len(),
            dir = %self.store.dir().display(),
            "Batch started"
        );
        Ok(())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn cursor(&self) -> Option<usize> {
        (!self.is_empty()).then_some(self.cursor)
    }

    pub(crate) fn current(&self) -> Result<&Submission, GradingError> {
        let id = self.order.get(self.cursor).ok_or(GradingError::EmptyBatch)?;
        self.store.get(id).ok_or(GradingError::EmptyBatch)
    }

    /// Moves the cursor one step, clamped to the batch. Returns the new cursor.
    pub(crate) fn advance(&mut self, direction: Direction) -> Result<usize, GradingError> {
        if self.is_empty() {
            return Err(GradingError::EmptyBatch);
        }

        self.cursor = match direction {
            Direction::Next => (self.cursor + 1).min(self.order.len() - 1),
            Direction::Prev => self.cursor.saturating_sub(1),
        };
        Ok(self.cursor)
    }

    /// Marks a grading pass as in flight and hands back its inputs.
    pub(crate) fn begin_grading(&mut self) -> Result<GradingJob, GradingError> {
        if self.grading {
            return Err(GradingError::BatchInProgress);
        }

        let submission = self.current()?.clone();
        let prompt = prompt::compose(&self.assignment, self.focus.as_deref(), &submission.source);
        self.grading = true;
        Ok(GradingJob { submission, prompt })
    }

    pub(crate) fn finish_grading(&mut self) {
        self.grading = false;
    }

    /// Drops the batch and its scratch directory.
    pub(crate) fn discard(&mut self) -> std::io::Result<()> {
        self.order.clear();
        self.cursor = 0;
        self.store.clear()
    }

    pub(crate) fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            assignment: self.assignment.clone(),
            focus: self.focus.clone(),
            submission_ids: self.order.clone(),
            cursor: self.cursor(),
            current_id: self.order.get(self.cursor).cloned(),
            total: self.order.len(),
            grading_in_progress: self.grading,
        }
    }
}
