use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::core::config::Settings;
use crate::services::feedback::{self, FeedbackResult};
use crate::services::model::{ModelClient, ModelError};
use crate::services::records::{GradedLog, GradedRecord};
use crate::services::session::GradingSession;

pub(crate) type SessionHandle = Arc<Mutex<GradingSession>>;

#[derive(Debug, Error)]
pub(crate) enum GradingError {
    #[error("{0}")]
    Validation(String),
    #[error("no submissions loaded; upload a batch first")]
    EmptyBatch,
    #[error("a grading pass is already running for this session")]
    BatchInProgress,
    #[error("grading session not found")]
    SessionNotFound,
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("submission storage failed: {0}")]
    Storage(#[from] std::io::Error),
}

pub(crate) fn lock_session(session: &SessionHandle) -> MutexGuard<'_, GradingSession> {
    session.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the session's in-flight flag however the pass ends, including cancellation.
struct InFlight<'a> {
    session: &'a SessionHandle,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock_session(self.session).finish_grading();
    }
}

/// Runs grading passes: prompt, model call, parse, record.
#[derive(Clone)]
pub(crate) struct GradingService {
    model: Arc<dyn ModelClient>,
    records: Arc<GradedLog>,
    budget: u32,
    timeout: Duration,
}

impl GradingService {
    pub(crate) fn new(
        model: Arc<dyn ModelClient>,
        records: Arc<GradedLog>,
        budget: u32,
        timeout: Duration,
    ) -> Self {
        Self { model, records, budget, timeout }
    }

    pub(crate) fn from_settings(
        settings: &Settings,
        model: Arc<dyn ModelClient>,
        records: Arc<GradedLog>,
    ) -> Self {
        Self::new(
            model,
            records,
            settings.token_budget(),
            Duration::from_secs(settings.model().request_timeout_seconds),
        )
    }

    pub(crate) fn model(&self) -> &dyn ModelClient {
        self.model.as_ref()
    }

    pub(crate) fn records(&self) -> &GradedLog {
        &self.records
    }

    /// Grades the submission under the cursor. The session lock is released while
    /// the model runs; the cursor is never moved.
    pub(crate) async fn grade_current(
        &self,
        session: &SessionHandle,
    ) -> Result<FeedbackResult, GradingError> {
        let (session_id, job) = {
            let mut guard = lock_session(session);
            let job = guard.begin_grading()?;
            (guard.id(), job)
        };
        let _in_flight = InFlight { session };

        let submission_id = job.submission.id.as_str();
        tracing::info!(
            session_id = %session_id,
            submission_id,
            model = %self.model.describe(),
            prompt_len = job.prompt.len(),
            "Grading submission"
        );

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.timeout, self.model.generate(&job.prompt, self.budget)).await;
        let elapsed = started.elapsed().as_secs_f64();

        let response = match outcome {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                tracing::error!(submission_id, error = %err, "Model call failed");
                metrics::counter!("grading_passes_total", "outcome" => "failed").increment(1);
                return Err(err.into());
            }
            Err(_) => {
                tracing::error!(
                    submission_id,
                    timeout_secs = self.timeout.as_secs(),
                    "Model call timed out"
                );
                metrics::counter!("grading_passes_total", "outcome" => "timeout").increment(1);
                return Err(ModelError::Timeout(self.timeout.as_secs()).into());
            }
        };

        let parsed = feedback::parse(&response);
        let result = FeedbackResult {
            submission_id: job.submission.id.clone(),
            raw_response: response,
            errors: parsed.errors,
            feedback: parsed.feedback,
        };

        let key = job.submission.identity.record_key();
        self.records.append(&key, GradedRecord::new(&job.submission.source, &result));

        metrics::counter!("grading_passes_total", "outcome" => "success").increment(1);
        metrics::histogram!("grading_duration_seconds").record(elapsed);
        tracing::info!(
            submission_id,
            student = %key,
            errors = result.errors.len(),
            duration_secs = elapsed,
            "Submission graded"
        );

        Ok(result)
    }
}
