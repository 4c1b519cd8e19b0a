mod handlers;

use axum::{routing::get, routing::post, Router};

use crate::core::state::AppState;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::create_session))
        .route("/:session_id", get(handlers::get_session).delete(handlers::delete_session))
        .route("/:session_id/batch", post(handlers::upload_batch))
        .route("/:session_id/current", get(handlers::current_submission))
        .route("/:session_id/navigate", post(handlers::navigate))
        .route("/:session_id/grade", post(handlers::grade_current))
}
