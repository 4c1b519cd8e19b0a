use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::validation::{decode_submission_text, validate_submission_extension};
use crate::core::state::AppState;
use crate::schemas::{
    BatchForm, CurrentSubmissionResponse, NavigateRequest, SessionCreatedResponse,
};
use crate::services::feedback::FeedbackResult;
use crate::services::grading::lock_session;
use crate::services::session::{SessionSnapshot, UploadedFile};

pub(super) async fn create_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionCreatedResponse>) {
    let session_id = state.sessions().create();
    (StatusCode::CREATED, Json(SessionCreatedResponse { session_id }))
}

pub(super) async fn get_session(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state.sessions().get(session_id)?;
    let snapshot = lock_session(&handle).snapshot();
    Ok(Json(snapshot))
}

pub(super) async fn delete_session(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    state.sessions().remove(session_id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub(super) async fn upload_batch(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state.sessions().get(session_id)?;
    let storage = state.settings().storage();
    let max_bytes = storage.max_upload_size_mb * 1024 * 1024;

    let mut assignment = String::new();
    let mut focus = None;
    let mut files = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| ApiError::BadRequest("Invalid multipart data".to_string()))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "assignment" => assignment = read_text(field, "assignment").await?,
            "focus" => focus = Some(read_text(field, "focus").await?),
            "files" | "files[]" => {
                if files.len() as u64 >= storage.max_files_per_batch {
                    return Err(ApiError::BadRequest(format!(
                        "A batch may contain at most {} files",
                        storage.max_files_per_batch
                    )));
                }

                let filename = field.file_name().unwrap_or("upload").to_string();
                validate_submission_extension(&filename, &storage.allowed_extensions)?;
                let bytes = read_capped(field, max_bytes, storage.max_upload_size_mb).await?;
                let content = decode_submission_text(&filename, bytes)?;
                files.push(UploadedFile { filename, content });
            }
            other => {
                tracing::debug!(field = other, "Ignoring unknown multipart field");
            }
        }
    }

    let form = BatchForm {
        assignment: assignment.trim().to_string(),
        focus: focus
            .map(|value: String| value.trim().to_string())
            .filter(|value| !value.is_empty()),
        files,
    };
    form.validate().map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let snapshot = {
        let mut session = lock_session(&handle);
        session.start(&form.assignment, form.focus.as_deref(), form.files)?;
        session.snapshot()
    };

    metrics::counter!("batches_uploaded_total").increment(1);
    Ok(Json(snapshot))
}

pub(super) async fn current_submission(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<CurrentSubmissionResponse>, ApiError> {
    let handle = state.sessions().get(session_id)?;
    let session = lock_session(&handle);
    let submission = session.current()?.clone();
    let snapshot = session.snapshot();

    Ok(Json(CurrentSubmissionResponse {
        cursor: snapshot.cursor.unwrap_or_default(),
        total: snapshot.total,
        submission,
    }))
}

pub(super) async fn navigate(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<NavigateRequest>,
) -> Result<Json<SessionSnapshot>, ApiError> {
    let handle = state.sessions().get(session_id)?;
    let mut session = lock_session(&handle);
    session.advance(payload.direction)?;
    Ok(Json(session.snapshot()))
}

pub(super) async fn grade_current(
    Path(session_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<FeedbackResult>, ApiError> {
    let handle = state.sessions().get(session_id)?;
    let result = state.grading().grade_current(&handle).await?;
    Ok(Json(result))
}

async fn read_text(field: Field<'_>, label: &str) -> Result<String, ApiError> {
    field.text().await.map_err(|_| ApiError::BadRequest(format!("Invalid {label} field")))
}

async fn read_capped(
    mut field: Field<'_>,
    max_bytes: u64,
    max_upload_size_mb: u64,
) -> Result<Vec<u8>, ApiError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|_| ApiError::BadRequest("Failed to read file".to_string()))?
    {
        let next_size = bytes.len() as u64 + chunk.len() as u64;
        if next_size > max_bytes {
            return Err(ApiError::BadRequest(format!(
                "File size exceeds {max_upload_size_mb}MB limit"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}
