use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use uuid::Uuid;

use crate::services::grading::{lock_session, GradingError, SessionHandle};
use crate::services::session::GradingSession;

/// Independent grading sessions, one scratch directory each under `root`.
#[derive(Debug)]
pub(crate) struct SessionRegistry {
    root: PathBuf,
    sessions: RwLock<HashMap<Uuid, SessionHandle>>,
}

impl SessionRegistry {
    pub(crate) fn new(root: PathBuf) -> Self {
        Self { root, sessions: RwLock::new(HashMap::new()) }
    }

    pub(crate) fn root(&self) -> &Path {
        &self.root
    }

    pub(crate) fn create(&self) -> Uuid {
        let id = Uuid::new_v4();
        let session = GradingSession::new(id, self.root.join(id.to_string()));

        let mut sessions = self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.insert(id, Arc::new(Mutex::new(session)));
        tracing::info!(session_id = %id, active = sessions.len(), "Grading session created");
        id
    }

    pub(crate) fn get(&self, id: Uuid) -> Result<SessionHandle, GradingError> {
        let sessions = self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.get(&id).cloned().ok_or(GradingError::SessionNotFound)
    }

    /// Ends a session and deletes its stored submissions. Refused while a pass is running.
    pub(crate) fn remove(&self, id: Uuid) -> Result<(), GradingError> {
        let handle = self.get(id)?;
        {
            let mut session = lock_session(&handle);
            if session.snapshot().grading_in_progress {
                return Err(GradingError::BatchInProgress);
            }
            session.discard()?;
        }

        let mut sessions = self.sessions.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.remove(&id);
        tracing::info!(session_id = %id, active = sessions.len(), "Grading session closed");
        Ok(())
    }

    pub(crate) fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }
}
