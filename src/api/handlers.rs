use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::collections::HashMap;

use crate::core::metrics;
use crate::core::state::AppState;
use crate::schemas::{HealthResponse, RootResponse};

pub(crate) async fn root(State(state): State<AppState>) -> Json<RootResponse> {
    let response = RootResponse {
        message: state.settings().api().project_name.clone(),
        version: state.settings().api().version.clone(),
        model: state.grading().model().describe(),
    };

    Json(response)
}

pub(crate) async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let mut status = "healthy".to_string();
    let mut components = HashMap::new();

    components.insert("model".to_string(), state.grading().model().describe());
    components.insert("sessions".to_string(), state.sessions().len().to_string());

    match tokio::fs::create_dir_all(state.sessions().root()).await {
        Ok(()) => {
            components.insert("upload_dir".to_string(), "healthy".to_string());
        }
        Err(err) => {
            components.insert("upload_dir".to_string(), format!("unhealthy: {err}"));
            status = "degraded".to_string();
        }
    }

    Json(HealthResponse { service: "grading-assistant".to_string(), status, components })
}

pub(crate) async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.settings().telemetry().prometheus_enabled {
        return StatusCode::NOT_FOUND.into_response();
    }

    match metrics::render() {
        Some(body) => ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
