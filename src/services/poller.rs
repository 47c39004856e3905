use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::models::job::JobState;
use crate::models::report::{WaitOutcome, WaitSummary};
use crate::services::compute::{ComputeError, ComputeService, RemoteStatus};
use crate::services::registry::{JobRegistry, RegistryError};

#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Pause between two poll passes.
    pub interval: Duration,
    /// Consecutive status errors after which a job is marked Failed locally.
    pub max_consecutive_failures: u32,
    /// Status requests in flight at once during a pass.
    pub concurrency: usize,
    /// Give up waiting after this long. `None` waits indefinitely.
    pub deadline: Option<Duration>,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            max_consecutive_failures: 5,
            concurrency: 4,
            deadline: None,
        }
    }
}

/// Counts for one poll pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub polled: usize,
    pub errors: usize,
    pub newly_terminal: usize,
}

/// Queries remote job state and advances the registry.
///
/// Status requests within a pass run concurrently; their results are
/// applied afterwards, one at a time and in registry order, so the
/// registry only ever has a single writer.
pub struct StatusPoller {
    compute: Arc<dyn ComputeService>,
    settings: PollSettings,
    failures: HashMap<String, u32>,
}

impl StatusPoller {
    pub fn new(compute: Arc<dyn ComputeService>, settings: PollSettings) -> Self {
        Self {
            compute,
            settings,
            failures: HashMap::new(),
        }
    }

    /// Poll every non-terminal job once.
    pub async fn poll_pass(&mut self, registry: &mut JobRegistry) -> PassReport {
        let targets: Vec<(String, String)> = registry
            .unfinished()
            .into_iter()
            .filter_map(|label| {
                let id = registry.get(&label)?.remote_job_id.clone();
                Some((label, id))
            })
            .collect();

        let compute = Arc::clone(&self.compute);
        let results: Vec<(String, Result<RemoteStatus, ComputeError>)> = stream::iter(targets)
            .map(|(label, id)| {
                let compute = Arc::clone(&compute);
                async move {
                    let result = compute.status(&id).await;
                    (label, result)
                }
            })
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await;

        let mut report = PassReport::default();
        for (label, result) in results {
            report.polled += 1;
            let before = registry.get(&label).map(|h| h.state);
            match result {
                Ok(status) => self.apply_status(registry, &label, status),
                Err(e) => {
                    report.errors += 1;
                    self.apply_error(registry, &label, e);
                }
            }
            let after = registry.get(&label).map(|h| h.state);
            if let (Some(before), Some(after)) = (before, after) {
                if !before.is_terminal() && after.is_terminal() {
                    report.newly_terminal += 1;
                    metrics::counter!("export_jobs_finished", "state" => after.to_string())
                        .increment(1);
                }
            }
        }
        report
    }

    fn apply_status(&mut self, registry: &mut JobRegistry, label: &str, status: RemoteStatus) {
        self.failures.remove(label);

        if let Some(message) = status.message {
            if let Err(e) = registry.set_note(label, message) {
                tracing::warn!(label, error = %e, "Could not record remote message");
            }
        }

        match registry.update_state(label, status.state) {
            Ok(()) => {
                let remote_job_id = registry
                    .get(label)
                    .map(|h| h.remote_job_id.as_str())
                    .unwrap_or_default();
                tracing::info!(label, remote_job_id, state = %status.state, "Job status");
            }
            Err(RegistryError::IllegalTransition { from, to, .. }) => {
                tracing::warn!(
                    label,
                    stored = %from,
                    reported = %to,
                    "Ignoring backwards state report"
                );
            }
            Err(e) => tracing::error!(label, error = %e, "Failed to update job state"),
        }
    }

    fn apply_error(&mut self, registry: &mut JobRegistry, label: &str, error: ComputeError) {
        metrics::counter!("export_poll_errors").increment(1);

        let count = self.failures.entry(label.to_string()).or_insert(0);
        *count += 1;
        let count = *count;

        if count < self.settings.max_consecutive_failures {
            tracing::warn!(
                label,
                error = %error,
                consecutive_failures = count,
                "Status poll failed, keeping last known state"
            );
            return;
        }

        tracing::error!(
            label,
            error = %error,
            consecutive_failures = count,
            "Status poll failure limit reached, marking job failed"
        );
        let note = format!(
            "marked failed locally after {} consecutive status errors: {}",
            count, error
        );
        if let Err(e) = registry
            .update_state(label, JobState::Failed)
            .and_then(|()| registry.set_note(label, note))
        {
            tracing::error!(label, error = %e, "Failed to mark job failed");
        }
    }

    /// Poll until every job is terminal, the token is cancelled, or the
    /// deadline passes. Termination is only evaluated after a pass has
    /// been fully applied to the registry.
    pub async fn wait_until_terminal(
        &mut self,
        registry: &mut JobRegistry,
        cancel: &CancellationToken,
    ) -> WaitSummary {
        let deadline = self.settings.deadline.map(|d| Instant::now() + d);
        let mut passes = 0u32;

        let outcome = loop {
            if registry.all_terminal() {
                break WaitOutcome::AllTerminal;
            }
            if cancel.is_cancelled() {
                break WaitOutcome::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break WaitOutcome::DeadlineExceeded;
            }

            let report = tokio::select! {
                _ = cancel.cancelled() => break WaitOutcome::Cancelled,
                report = self.poll_pass(registry) => report,
            };
            passes += 1;

            let unfinished = registry.unfinished().len();
            tracing::info!(
                pass = passes,
                polled = report.polled,
                errors = report.errors,
                unfinished,
                "Poll pass complete"
            );

            if unfinished == 0 {
                break WaitOutcome::AllTerminal;
            }

            let mut wake = Instant::now() + self.settings.interval;
            if let Some(d) = deadline {
                wake = wake.min(d);
            }
            tracing::debug!(interval_secs = self.settings.interval.as_secs(), "Waiting before next poll");
            tokio::select! {
                _ = cancel.cancelled() => break WaitOutcome::Cancelled,
                _ = tokio::time::sleep_until(wake) => {}
            }
        };

        match outcome {
            WaitOutcome::AllTerminal => tracing::info!(passes, "All export jobs finished"),
            WaitOutcome::Cancelled => tracing::warn!(passes, "Wait for export jobs cancelled"),
            WaitOutcome::DeadlineExceeded => {
                tracing::warn!(passes, "Deadline passed before all export jobs finished")
            }
        }

        WaitSummary { outcome, passes }
    }
}
