pub(crate) mod api;
mod cli;
pub(crate) mod core;
pub(crate) mod schemas;
pub(crate) mod services;

#[cfg(test)]
mod test_support;

pub use cli::{run_cli, CliOptions};

use crate::core::{config::Settings, state::AppState, telemetry};
use crate::services::model;

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    tokio::fs::create_dir_all(&settings.storage().upload_dir).await?;

    let model = model::from_settings(&settings)?;
    tracing::info!(
        model = %model.describe(),
        budget = settings.token_budget(),
        timeout_secs = settings.model().request_timeout_seconds,
        "Model backend ready"
    );

    let state = AppState::new(settings, model);
    let app = api::router::router(state.clone());
    let listener = tokio::net::TcpListener::bind(state.settings().server_addr()).await?;

    tracing::info!(
        host = %state.settings().server_host(),
        port = state.settings().server_port(),
        environment = %state.settings().runtime().environment.as_str(),
        backend = state.settings().model().backend.as_str(),
        upload_dir = %state.settings().storage().upload_dir.display(),
        "Grading assistant listening"
    );

    axum::serve(listener, app).with_graceful_shutdown(core::shutdown::shutdown_signal()).await?;

    Ok(())
}
