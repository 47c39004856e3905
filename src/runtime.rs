//! Process plumbing shared by the binaries.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use crate::models::report::RunReport;

/// Structured JSON logging, `RUST_LOG` overrides the `info` default.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();
}

/// Register metric descriptions and, when an address is given, serve
/// them for Prometheus scraping.
pub fn init_metrics(addr: Option<SocketAddr>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    if let Some(addr) = addr {
        PrometheusBuilder::new().with_http_listener(addr).install()?;
        tracing::info!(%addr, "Serving Prometheus metrics");
    }

    metrics::describe_counter!("export_jobs_submitted", "Export jobs accepted by the compute service");
    metrics::describe_counter!("export_jobs_rejected", "Export jobs that could not be submitted");
    metrics::describe_counter!("export_jobs_finished", "Export jobs that reached a terminal state");
    metrics::describe_counter!("export_poll_errors", "Failed job status requests");
    metrics::describe_counter!("artifacts_downloaded", "Artifacts written to the local archive");
    metrics::describe_counter!("artifacts_download_failed", "Artifacts whose download failed");
    metrics::describe_counter!("artifacts_orphaned", "Downloaded artifacts whose remote delete failed");
    Ok(())
}

/// Cancel `token` on Ctrl-C. Work in progress stops at the next
/// suspension point.
pub fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupt received, stopping after current operations");
                token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for interrupt"),
        }
    });
}

/// Print the summary, write the JSON report if asked, and pick the exit
/// status.
pub fn finish(report: &RunReport, report_path: Option<&Path>) -> ExitCode {
    println!("{}", report);

    for orphan in report.orphans() {
        tracing::warn!(title = %orphan.title, "Remote copy still present, delete it manually");
    }

    if let Some(path) = report_path {
        match serde_json::to_vec_pretty(report) {
            Ok(json) => match std::fs::write(path, json) {
                Ok(()) => tracing::info!(path = %path.display(), "Run report written"),
                Err(e) => tracing::error!(path = %path.display(), error = %e, "Failed to write run report"),
            },
            Err(e) => tracing::error!(error = %e, "Failed to serialize run report"),
        }
    }

    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
