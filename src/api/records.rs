use std::collections::BTreeMap;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::core::state::AppState;
use crate::services::records::GradedRecord;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/", get(list_records)).route("/:student", get(student_records))
}

async fn list_records(State(state): State<AppState>) -> Json<BTreeMap<String, Vec<GradedRecord>>> {
    Json(state.records().snapshot())
}

/// `student` is the `name-email` key the records were filed under.
async fn student_records(
    Path(student): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<GradedRecord>>, ApiError> {
    let records = state.records().records_for(&student);
    if records.is_empty() {
        return Err(ApiError::NotFound(format!("No graded records for '{student}'")));
    }
    Ok(Json(records))
}
