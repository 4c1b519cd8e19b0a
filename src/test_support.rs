use std::sync::{Arc, Mutex as StdMutex, OnceLock};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    Router,
};
use tempfile::TempDir;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::api;
use crate::core::{config::Settings, state::AppState};
use crate::services::model::{ModelClient, ModelError};

const MULTIPART_BOUNDARY: &str = "grading-test-boundary";

pub(crate) struct TestContext {
    pub(crate) state: AppState,
    pub(crate) app: Router,
    _scratch: TempDir,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("GRADER_ENV", "test");
    std::env::set_var("GRADER_STRICT_CONFIG", "0");
    std::env::remove_var("ENVIRONMENT");
    std::env::remove_var("MODEL_BACKEND");
    std::env::remove_var("MODEL_REQUEST_TIMEOUT");
    std::env::remove_var("MODEL_MAX_TOKENS");
    std::env::set_var("OPENAI_API_KEY", "sk-test");
    std::env::remove_var("OPENAI_API_KEY_FILE");
    std::env::set_var("OPENAI_BASE_URL", "http://127.0.0.1:9/v1");
    std::env::remove_var("COMPLETION_ENGINE");
    std::env::remove_var("HF_TOKEN");
    std::env::remove_var("HF_TOKEN_FILE");
    std::env::remove_var("LOCAL_MAX_LENGTH");
    std::env::remove_var("UPLOAD_DIR");
    std::env::remove_var("MAX_UPLOAD_SIZE_MB");
    std::env::remove_var("MAX_FILES_PER_BATCH");
    std::env::remove_var("ALLOWED_SUBMISSION_EXTENSIONS");
    std::env::remove_var("API_V1_STR");
    std::env::remove_var("PROJECT_NAME");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

pub(crate) fn build_state(settings: Settings, model: Arc<dyn ModelClient>) -> AppState {
    AppState::new(settings, model)
}

/// Router over a scratch upload directory. `configure` runs after the test
/// environment is set and before settings are loaded.
pub(crate) async fn setup_test_context_with(
    model: Arc<dyn ModelClient>,
    configure: impl FnOnce(),
) -> TestContext {
    let guard = env_lock().await;
    set_test_env();

    let scratch = tempfile::tempdir().expect("scratch dir");
    std::env::set_var("UPLOAD_DIR", scratch.path().join("uploads"));
    configure();

    let settings = Settings::load().expect("settings");
    set_test_env();

    let state = build_state(settings, model);
    let app = api::router::router(state.clone());

    TestContext { state, app, _scratch: scratch, _guard: guard }
}

pub(crate) async fn setup_test_context(model: Arc<dyn ModelClient>) -> TestContext {
    setup_test_context_with(model, || {}).await
}

/// Returns a fixed response and remembers every prompt it was given.
pub(crate) struct StaticModel {
    response: String,
    prompts: StdMutex<Vec<String>>,
}

impl StaticModel {
    pub(crate) fn new(response: &str) -> Arc<Self> {
        Arc::new(Self { response: response.to_string(), prompts: StdMutex::new(Vec::new()) })
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }
}

#[async_trait]
impl ModelClient for StaticModel {
    async fn generate(&self, prompt: &str, _budget: u32) -> Result<String, ModelError> {
        self.prompts.lock().expect("prompts lock").push(prompt.to_string());
        Ok(self.response.clone())
    }

    fn describe(&self) -> String {
        "static".to_string()
    }
}

pub(crate) struct FailingModel;

#[async_trait]
impl ModelClient for FailingModel {
    async fn generate(&self, _prompt: &str, _budget: u32) -> Result<String, ModelError> {
        Err(ModelError::Upstream("model unavailable".to_string()))
    }

    fn describe(&self) -> String {
        "failing".to_string()
    }
}

/// Never answers; used to hold a pass in flight or trip the timeout.
pub(crate) struct StalledModel;

#[async_trait]
impl ModelClient for StalledModel {
    async fn generate(&self, _prompt: &str, _budget: u32) -> Result<String, ModelError> {
        std::future::pending::<()>().await;
        Err(ModelError::Upstream("unreachable".to_string()))
    }

    fn describe(&self) -> String {
        "stalled".to_string()
    }
}

pub(crate) fn json_request(
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);

    if let Some(body) = body {
        let bytes = serde_json::to_vec(&body).expect("serialize body");
        builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(bytes))
            .expect("request body")
    } else {
        builder.body(Body::empty()).expect("request body")
    }
}

/// Builds a `multipart/form-data` batch upload. `files` are `(filename, bytes)` pairs.
pub(crate) fn batch_request(
    uri: &str,
    assignment: &str,
    focus: Option<&str>,
    files: &[(&str, &[u8])],
) -> Request<Body> {
    let mut body = Vec::new();
    let mut text_part = |name: &str, value: &str| {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    };
    text_part("assignment", assignment);
    if let Some(focus) = focus {
        text_part("focus", focus);
    }

    for (filename, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{MULTIPART_BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{filename}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{MULTIPART_BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={MULTIPART_BOUNDARY}"))
        .body(Body::from(body))
        .expect("multipart request")
}

pub(crate) async fn read_json(response: axum::response::Response<Body>) -> serde_json::Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.expect("response body");
    serde_json::from_slice(&body).unwrap_or_else(|err| {
        let body_text = String::from_utf8_lossy(&body);
        panic!("json parse: {err}; body: {body_text}");
    })
}
