use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::grading::GradingError;
use crate::services::model::ModelError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_step: Option<&'static str>,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    EmptyBatch(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn parts(self) -> (StatusCode, String, Option<&'static str>) {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message, None),
            ApiError::EmptyBatch(message) => (StatusCode::CONFLICT, message, Some("upload")),
            ApiError::BadGateway(message) => (StatusCode::BAD_GATEWAY, message, None),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, message, None)
            }
        }
    }
}

impl From<GradingError> for ApiError {
    fn from(err: GradingError) -> Self {
        match err {
            GradingError::Validation(message) => ApiError::BadRequest(message),
            GradingError::EmptyBatch => ApiError::EmptyBatch(err.to_string()),
            GradingError::BatchInProgress => ApiError::Conflict(err.to_string()),
            GradingError::SessionNotFound => ApiError::NotFound(err.to_string()),
            GradingError::Model(ModelError::Auth(message)) => {
                tracing::error!(error = %message, "Model endpoint rejected credentials");
                ApiError::BadGateway(
                    "Grading failed: the model endpoint rejected our credentials".to_string(),
                )
            }
            GradingError::Model(model) => {
                tracing::warn!(error = %model, "Grading pass failed");
                ApiError::BadGateway(format!("Grading failed, please retry: {model}"))
            }
            GradingError::Storage(io) => ApiError::internal(io, "Failed to store submissions"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, next_step) = self.parts();
        (status, Json(ErrorResponse { status: status.as_u16(), detail, next_step })).into_response()
    }
}
