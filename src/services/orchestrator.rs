//! Top-level run: submit, wait, list, retrieve.
//!
//! Errors confined to one job or one artifact end up in the
//! [`RunReport`]; only a folder that cannot be resolved stops the
//! retrieval phase, and even then the job results are still reported.

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::artifact::RetrievalRecord;
use crate::models::descriptor::JobDescriptor;
use crate::models::job::JobState;
use crate::models::report::{
    ArtifactSummary, JobSummary, RetrievalPhase, RunReport, SubmissionFailure, WaitOutcome,
    WaitSummary,
};
use crate::services::classify::ClassificationRule;
use crate::services::lister::ArtifactLister;
use crate::services::poller::{PollSettings, StatusPoller};
use crate::services::registry::JobRegistry;
use crate::services::retriever::{ArtifactRetriever, RetrievalSettings};
use crate::services::submitter::JobSubmitter;

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Remote folder the exports land in.
    pub folder: String,
    pub poll: PollSettings,
    pub retrieval: RetrievalSettings,
    pub rule: ClassificationRule,
}

pub struct Orchestrator {
    submitter: JobSubmitter,
    poller: StatusPoller,
    lister: ArtifactLister,
    retriever: ArtifactRetriever,
    folder: String,
}

impl Orchestrator {
    pub fn new(state: &AppState, settings: RunSettings) -> Self {
        Self {
            submitter: JobSubmitter::new(state.compute.clone()),
            poller: StatusPoller::new(state.compute.clone(), settings.poll),
            lister: ArtifactLister::new(state.storage.clone()),
            retriever: ArtifactRetriever::new(
                state.storage.clone(),
                settings.rule,
                settings.retrieval,
            ),
            folder: settings.folder,
        }
    }

    /// Full run over `descriptors`.
    pub async fn run(
        &mut self,
        descriptors: Vec<JobDescriptor>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("run", %run_id);
        self.run_inner(run_id, descriptors, cancel)
            .instrument(span)
            .await
    }

    async fn run_inner(
        &mut self,
        run_id: Uuid,
        descriptors: Vec<JobDescriptor>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let started_at = Utc::now();
        tracing::info!(jobs = descriptors.len(), folder = %self.folder, "Starting export run");

        let batch = self.submitter.submit_all(descriptors, cancel).await;
        let mut registry = batch.registry;
        tracing::info!(
            submitted = registry.len(),
            rejected = batch.failures.len(),
            "Submission phase complete"
        );

        let wait = self.poller.wait_until_terminal(&mut registry, cancel).await;

        let (retrieval, records) = match wait.outcome {
            WaitOutcome::AllTerminal => {
                let prefixes: Vec<String> = registry
                    .with_state(JobState::Completed)
                    .map(|h| h.descriptor.filename_prefix.clone())
                    .collect();
                if prefixes.is_empty() {
                    (
                        RetrievalPhase::Skipped {
                            reason: "no export job completed".to_string(),
                        },
                        Vec::new(),
                    )
                } else {
                    self.retrieve(Some(prefixes.as_slice()), cancel).await
                }
            }
            WaitOutcome::Cancelled => (
                RetrievalPhase::Skipped {
                    reason: "run cancelled while waiting for jobs".to_string(),
                },
                Vec::new(),
            ),
            WaitOutcome::DeadlineExceeded => (
                RetrievalPhase::Skipped {
                    reason: format!(
                        "deadline passed with {} job(s) unfinished",
                        registry.unfinished().len()
                    ),
                },
                Vec::new(),
            ),
        };

        build_report(
            run_id,
            started_at,
            &registry,
            batch.failures,
            Some(wait),
            retrieval,
            &records,
        )
    }

    /// Retrieval phase alone, taking every artifact with the export
    /// extension. Used to recover after an interrupted run.
    pub async fn retrieve_only(&self, cancel: &CancellationToken) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let span = tracing::info_span!("retrieve", %run_id);

        let (retrieval, records) = self.retrieve(None, cancel).instrument(span).await;
        build_report(
            run_id,
            started_at,
            &JobRegistry::new(),
            Vec::new(),
            None,
            retrieval,
            &records,
        )
    }

    async fn retrieve(
        &self,
        prefixes: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> (RetrievalPhase, Vec<RetrievalRecord>) {
        if cancel.is_cancelled() {
            return (
                RetrievalPhase::Skipped {
                    reason: "run cancelled before retrieval".to_string(),
                },
                Vec::new(),
            );
        }

        let artifacts = match self.lister.list(&self.folder).await {
            Ok(artifacts) => artifacts,
            Err(e) => {
                tracing::error!(folder = %self.folder, error = %e, "Retrieval phase aborted");
                return (
                    RetrievalPhase::Aborted {
                        reason: e.to_string(),
                    },
                    Vec::new(),
                );
            }
        };

        let records = self.retriever.retrieve_all(artifacts, prefixes, cancel).await;
        let phase = if cancel.is_cancelled() {
            RetrievalPhase::Skipped {
                reason: "run cancelled during retrieval".to_string(),
            }
        } else {
            RetrievalPhase::Completed
        };
        (phase, records)
    }
}

fn build_report(
    run_id: Uuid,
    started_at: DateTime<Utc>,
    registry: &JobRegistry,
    submission_failures: Vec<SubmissionFailure>,
    wait: Option<WaitSummary>,
    retrieval: RetrievalPhase,
    records: &[RetrievalRecord],
) -> RunReport {
    RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        jobs: registry.handles().iter().map(JobSummary::from).collect(),
        submission_failures,
        wait,
        retrieval,
        artifacts: records.iter().map(ArtifactSummary::from).collect(),
    }
}
