use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::models::artifact::RetrievalRecord;
use crate::models::job::{JobHandle, JobState};

/// A descriptor that never became a running job.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionFailure {
    pub label: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitOutcome {
    AllTerminal,
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WaitSummary {
    pub outcome: WaitOutcome,
    pub passes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrievalPhase {
    Completed,
    Skipped { reason: String },
    Aborted { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub label: String,
    pub remote_job_id: String,
    pub state: JobState,
    pub note: Option<String>,
}

impl From<&JobHandle> for JobSummary {
    fn from(handle: &JobHandle) -> Self {
        Self {
            label: handle.label().to_string(),
            remote_job_id: handle.remote_job_id.clone(),
            state: handle.state,
            note: handle.note.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactOutcome {
    /// Downloaded and removed remotely.
    Retrieved,
    /// Downloaded, remote copy still present.
    Orphaned,
    DownloadFailed,
    /// Not attempted because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ArtifactSummary {
    pub title: String,
    pub label: String,
    pub local_path: PathBuf,
    pub downloaded: bool,
    pub remote_deleted: bool,
    pub bytes: u64,
    pub outcome: ArtifactOutcome,
    pub error: Option<String>,
}

impl From<&RetrievalRecord> for ArtifactSummary {
    fn from(record: &RetrievalRecord) -> Self {
        let outcome = if record.remote_deleted() {
            ArtifactOutcome::Retrieved
        } else if record.downloaded() {
            ArtifactOutcome::Orphaned
        } else if record.skipped {
            ArtifactOutcome::Skipped
        } else {
            ArtifactOutcome::DownloadFailed
        };
        Self {
            title: record.artifact.title.clone(),
            label: record.label.dir_name(),
            local_path: record.local_path.clone(),
            downloaded: record.downloaded(),
            remote_deleted: record.remote_deleted(),
            bytes: record.bytes,
            outcome,
            error: record.error.clone(),
        }
    }
}

/// Final summary of one run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub jobs: Vec<JobSummary>,
    pub submission_failures: Vec<SubmissionFailure>,
    pub wait: Option<WaitSummary>,
    pub retrieval: RetrievalPhase,
    pub artifacts: Vec<ArtifactSummary>,
}

impl RunReport {
    pub fn count(&self, outcome: ArtifactOutcome) -> usize {
        self.artifacts.iter().filter(|a| a.outcome == outcome).count()
    }

    pub fn orphans(&self) -> impl Iterator<Item = &ArtifactSummary> {
        self.artifacts
            .iter()
            .filter(|a| a.outcome == ArtifactOutcome::Orphaned)
    }

    /// Retrieval ran to completion and every expected artifact arrived.
    pub fn is_success(&self) -> bool {
        self.retrieval == RetrievalPhase::Completed
            && self.count(ArtifactOutcome::DownloadFailed) == 0
            && self.count(ArtifactOutcome::Skipped) == 0
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(f, "Jobs:")?;
        for job in &self.jobs {
            write!(f, "  {:<28} {}", job.label, job.state)?;
            if let Some(note) = &job.note {
                write!(f, " ({})", note)?;
            }
            writeln!(f)?;
        }
        for failure in &self.submission_failures {
            writeln!(f, "  {:<28} not submitted: {}", failure.label, failure.reason)?;
        }

        match &self.retrieval {
            RetrievalPhase::Completed => writeln!(f, "Artifacts:")?,
            RetrievalPhase::Skipped { reason } => writeln!(f, "Retrieval skipped: {}", reason)?,
            RetrievalPhase::Aborted { reason } => writeln!(f, "Retrieval aborted: {}", reason)?,
        }
        for artifact in &self.artifacts {
            let status = match artifact.outcome {
                ArtifactOutcome::Retrieved => "downloaded, remote removed",
                ArtifactOutcome::Orphaned => "downloaded, remote ORPHANED",
                ArtifactOutcome::DownloadFailed => "download FAILED, remote kept",
                ArtifactOutcome::Skipped => "skipped, remote kept",
            };
            write!(f, "  {:<40} -> {:<14} {}", artifact.title, artifact.label, status)?;
            if let Some(error) = &artifact.error {
                write!(f, ": {}", error)?;
            }
            writeln!(f)?;
        }

        write!(
            f,
            "{} retrieved, {} orphaned, {} failed, {} skipped",
            self.count(ArtifactOutcome::Retrieved),
            self.count(ArtifactOutcome::Orphaned),
            self.count(ArtifactOutcome::DownloadFailed),
            self.count(ArtifactOutcome::Skipped)
        )
    }
}
