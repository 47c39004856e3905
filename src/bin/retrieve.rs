//! Retrieval only: download and clean up whatever is in the export
//! folder without submitting new jobs. Useful after an interrupted run.

use raster_export_sync::{
    app_state::AppState, config::AppConfig, runtime, services::orchestrator::Orchestrator,
};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    runtime::init_tracing();

    tracing::info!("Starting artifact retrieval");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    runtime::init_metrics(config.metrics_addr).expect("Failed to install Prometheus metrics exporter");

    let state = AppState::from_config(&config).expect("Failed to initialize remote service clients");

    let cancel = CancellationToken::new();
    runtime::cancel_on_ctrl_c(cancel.clone());

    let orchestrator = Orchestrator::new(&state, config.run_settings());
    let report = orchestrator.retrieve_only(&cancel).await;

    runtime::finish(&report, config.report_path.as_deref())
}
