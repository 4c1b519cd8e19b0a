#[cfg_attr(not(feature = "local"), allow(dead_code))]
mod beam;
mod hosted;
#[cfg(feature = "local")]
mod local;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::{ModelBackend, Settings};

pub(crate) use hosted::HostedCompletion;
#[cfg(feature = "local")]
pub(crate) use local::LocalGeneration;

#[derive(Debug, Error)]
pub(crate) enum ModelError {
    #[error("model endpoint request failed: {0}")]
    Upstream(String),
    #[error("model endpoint rejected the credentials: {0}")]
    Auth(String),
    #[error("model did not respond within {0} seconds")]
    Timeout(u64),
    #[error("failed to load model: {0}")]
    ModelLoad(String),
}

/// Text generation capability shared by every backend.
///
/// `budget` is authoritative: completion tokens for hosted endpoints, total sequence
/// length for local decoding.
#[async_trait]
pub(crate) trait ModelClient: Send + Sync {
    async fn generate(&self, prompt: &str, budget: u32) -> Result<String, ModelError>;

    fn describe(&self) -> String;
}

pub(crate) fn from_settings(settings: &Settings) -> Result<Arc<dyn ModelClient>, ModelError> {
    match settings.model().backend {
        ModelBackend::Hosted => Ok(Arc::new(HostedCompletion::from_settings(settings)?)),
        ModelBackend::Local => load_local(settings),
    }
}

#[cfg(feature = "local")]
fn load_local(settings: &Settings) -> Result<Arc<dyn ModelClient>, ModelError> {
    Ok(Arc::new(LocalGeneration::load(settings.local())?))
}

#[cfg(not(feature = "local"))]
fn load_local(_settings: &Settings) -> Result<Arc<dyn ModelClient>, ModelError> {
    Err(ModelError::ModelLoad(
        "local generation requires building with the `local` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn hosted_backend_is_built_from_settings() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        let client = from_settings(&settings).expect("hosted client");
        assert!(client.describe().starts_with("hosted:"));
    }

    #[cfg(not(feature = "local"))]
    #[tokio::test]
    async fn local_backend_without_feature_fails_to_load() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("MODEL_BACKEND", "local");

        let settings = Settings::load().expect("settings");
        std::env::remove_var("MODEL_BACKEND");
        let err = from_settings(&settings).err().expect("load error");
        assert!(matches!(err, ModelError::ModelLoad(_)));
    }
}
