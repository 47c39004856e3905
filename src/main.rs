use raster_export_sync::{
    app_state::AppState, config::AppConfig, runtime, services::orchestrator::Orchestrator,
};
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    runtime::init_tracing();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing raster-export-sync");

    runtime::init_metrics(config.metrics_addr).expect("Failed to install Prometheus metrics exporter");

    // Remote clients are created once and shared by every phase
    tracing::info!(backend = ?config.storage_backend, "Initializing remote service clients");
    let state = AppState::from_config(&config).expect("Failed to initialize remote service clients");

    let cancel = CancellationToken::new();
    runtime::cancel_on_ctrl_c(cancel.clone());

    let descriptors = config.export_plan().descriptors();
    tracing::info!(
        jobs = descriptors.len(),
        start_year = config.start_year,
        end_year = config.end_year,
        "Export plan built"
    );

    let mut orchestrator = Orchestrator::new(&state, config.run_settings());
    let report = orchestrator.run(descriptors, &cancel).await;

    runtime::finish(&report, config.report_path.as_deref())
}
