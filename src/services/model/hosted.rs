use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::{ModelClient, ModelError};
use crate::core::config::Settings;

/// Remote text-completion endpoint (`POST {base_url}/completions`).
#[derive(Debug, Clone)]
pub(crate) struct HostedCompletion {
    client: Client,
    api_key: String,
    url: String,
    engine: String,
}

impl HostedCompletion {
    pub(crate) fn from_settings(settings: &Settings) -> Result<Self, ModelError> {
        let hosted = settings.hosted();
        if hosted.api_key.trim().is_empty() {
            return Err(ModelError::Auth("OPENAI_API_KEY is not configured".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(hosted.connect_timeout_seconds))
            .build()
            .map_err(|err| ModelError::Upstream(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            client,
            api_key: hosted.api_key.clone(),
            url: hosted.completions_url(),
            engine: hosted.engine.clone(),
        })
    }
}

#[async_trait]
impl ModelClient for HostedCompletion {
    async fn generate(&self, prompt: &str, budget: u32) -> Result<String, ModelError> {
        let payload = json!({
            "model": self.engine,
            "prompt": prompt,
            "max_tokens": budget,
        });

        tracing::info!(engine = %self.engine, max_tokens = budget, "Sending completion request");
        let timer = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| ModelError::Upstream(format!("failed to call completion API: {err}")))?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(ModelError::Auth(format!("{status}: {}", error_message(&body))));
        }
        if !status.is_success() {
            return Err(ModelError::Upstream(format!("{status}: {}", error_message(&body))));
        }

        let text = body
            .get("choices")
            .and_then(|choices| choices.get(0))
            .and_then(|choice| choice.get("text"))
            .and_then(|value| value.as_str())
            .ok_or_else(|| ModelError::Upstream("missing completion text".to_string()))?;

        let tokens_used = body
            .get("usage")
            .and_then(|usage| usage.get("total_tokens"))
            .and_then(|value| value.as_u64());

        tracing::info!(
            engine = %self.engine,
            duration_seconds = timer.elapsed().as_secs_f64(),
            tokens_used = tokens_used,
            "Completion received"
        );

        Ok(text.trim().to_string())
    }

    fn describe(&self) -> String {
        format!("hosted:{}", self.engine)
    }
}

fn error_message(body: &Value) -> String {
    body.get("error")
        .and_then(|error| error.get("message"))
        .and_then(|message| message.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::HeaderMap, routing::post, Json, Router};
    use crate::test_support;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{addr}/v1")
    }

    async fn client_for(base_url: &str) -> HostedCompletion {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("OPENAI_BASE_URL", base_url);
        let settings = Settings::load().expect("settings");
        HostedCompletion::from_settings(&settings).expect("client")
    }

    #[tokio::test]
    async fn returns_trimmed_completion_text() {
        let router = Router::new().route(
            "/v1/completions",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(
                    headers.get("authorization").and_then(|v| v.to_str().ok()),
                    Some("Bearer sk-test")
                );
                assert_eq!(body["max_tokens"], 64);
                assert_eq!(body["model"], "davinci-002");
                Json(json!({
                    "choices": [{"text": "  1: typo\n\nNice work.\n"}],
                    "usage": {"total_tokens": 42}
                }))
            }),
        );
        let base = serve(router).await;
        let client = client_for(&base).await;

        let text = client.generate("grade this", 64).await.expect("completion");
        assert_eq!(text, "1: typo\n\nNice work.");
    }

    #[tokio::test]
    async fn server_error_surfaces_as_upstream() {
        let router = Router::new().route(
            "/v1/completions",
            post(|| async {
                (
                    axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": {"message": "engine overloaded"}})),
                )
            }),
        );
        let base = serve(router).await;
        let client = client_for(&base).await;

        let err = client.generate("grade this", 16).await.expect_err("upstream error");
        match err {
            ModelError::Upstream(message) => assert!(message.contains("engine overloaded")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rejected_key_surfaces_as_auth() {
        let router = Router::new().route(
            "/v1/completions",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(json!({"error": {"message": "Incorrect API key provided"}})),
                )
            }),
        );
        let base = serve(router).await;
        let client = client_for(&base).await;

        let err = client.generate("grade this", 16).await.expect_err("auth error");
        assert!(matches!(err, ModelError::Auth(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_as_upstream() {
        let client = client_for("http://127.0.0.1:9/v1").await;
        let err = client.generate("grade this", 16).await.expect_err("network error");
        assert!(matches!(err, ModelError::Upstream(_)));
    }

    #[tokio::test]
    async fn missing_choices_is_upstream_error() {
        let router =
            Router::new().route("/v1/completions", post(|| async { Json(json!({"choices": []})) }));
        let base = serve(router).await;
        let client = client_for(&base).await;

        let err = client.generate("grade this", 16).await.expect_err("malformed body");
        assert!(matches!(err, ModelError::Upstream(_)));
    }
}
