use std::sync::Arc;

use crate::core::config::Settings;
use crate::services::grading::GradingService;
use crate::services::model::ModelClient;
use crate::services::records::GradedLog;
use crate::services::registry::SessionRegistry;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    sessions: SessionRegistry,
    grading: GradingService,
}

impl AppState {
    pub(crate) fn new(settings: Settings, model: Arc<dyn ModelClient>) -> Self {
        let sessions = SessionRegistry::new(settings.storage().upload_dir.clone());
        let grading = GradingService::from_settings(&settings, model, Arc::new(GradedLog::new()));
        Self { inner: Arc::new(InnerState { settings, sessions, grading }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    pub(crate) fn grading(&self) -> &GradingService {
        &self.inner.grading
    }

    pub(crate) fn records(&self) -> &GradedLog {
        self.inner.grading.records()
    }
}
