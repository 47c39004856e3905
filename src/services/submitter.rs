use garde::Validate;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::models::descriptor::JobDescriptor;
use crate::models::job::JobHandle;
use crate::models::report::SubmissionFailure;
use crate::services::compute::{ComputeError, ComputeService};
use crate::services::registry::{JobRegistry, RegistryError};

/// Result of submitting a batch of descriptors.
#[derive(Debug, Default)]
pub struct SubmissionBatch {
    pub registry: JobRegistry,
    pub failures: Vec<SubmissionFailure>,
}

/// Turns descriptors into running remote jobs.
pub struct JobSubmitter {
    compute: Arc<dyn ComputeService>,
}

impl JobSubmitter {
    pub fn new(compute: Arc<dyn ComputeService>) -> Self {
        Self { compute }
    }

    /// Validate and submit one descriptor. The returned handle is Pending.
    pub async fn submit(&self, descriptor: Arc<JobDescriptor>) -> Result<JobHandle, SubmissionError> {
        descriptor
            .validate()
            .map_err(|report| SubmissionError::Invalid {
                label: descriptor.label.clone(),
                reason: report.to_string(),
            })?;

        let remote_job_id = self
            .compute
            .submit(&descriptor)
            .await
            .map_err(|source| SubmissionError::Rejected {
                label: descriptor.label.clone(),
                source,
            })?;

        Ok(JobHandle::new(descriptor, remote_job_id))
    }

    /// Submit every descriptor in order. A rejected descriptor is recorded
    /// and the rest are still submitted.
    pub async fn submit_all(
        &self,
        descriptors: Vec<JobDescriptor>,
        cancel: &CancellationToken,
    ) -> SubmissionBatch {
        let mut batch = SubmissionBatch::default();

        for descriptor in descriptors {
            let label = descriptor.label.clone();

            if cancel.is_cancelled() {
                batch.failures.push(SubmissionFailure {
                    label,
                    reason: SubmissionError::Cancelled.to_string(),
                });
                continue;
            }

            // Checked before submitting so a duplicate never creates a remote job.
            if batch.registry.get(&label).is_some() {
                let err = SubmissionError::Registry(RegistryError::DuplicateLabel(label.clone()));
                tracing::warn!(label = %label, error = %err, "Skipping duplicate descriptor");
                batch.failures.push(SubmissionFailure {
                    label,
                    reason: err.to_string(),
                });
                continue;
            }

            tracing::info!(
                label = %label,
                start = %descriptor.window.start,
                end = %descriptor.window.end,
                prefix = %descriptor.filename_prefix,
                "Submitting export job"
            );

            let result = match self.submit(Arc::new(descriptor)).await {
                Ok(handle) => {
                    let remote_job_id = handle.remote_job_id.clone();
                    batch
                        .registry
                        .add(handle)
                        .map(|()| remote_job_id)
                        .map_err(SubmissionError::Registry)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(remote_job_id) => {
                    metrics::counter!("export_jobs_submitted").increment(1);
                    tracing::info!(label = %label, remote_job_id = %remote_job_id, "Export job submitted");
                }
                Err(e) => {
                    metrics::counter!("export_jobs_rejected").increment(1);
                    tracing::error!(label = %label, error = %e, "Export job submission failed");
                    batch.failures.push(SubmissionFailure {
                        label,
                        reason: e.to_string(),
                    });
                }
            }
        }

        batch
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    #[error("Descriptor '{label}' is invalid: {reason}")]
    Invalid { label: String, reason: String },

    #[error("Compute service rejected '{label}': {source}")]
    Rejected {
        label: String,
        #[source]
        source: ComputeError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Submission cancelled before this job was sent")]
    Cancelled,
}
