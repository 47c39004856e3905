use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use strum::{Display, EnumString};

use crate::models::descriptor::JobDescriptor;

/// Lifecycle state of a remote export job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    /// Completed, Failed and Cancelled admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    fn rank(&self) -> u8 {
        match self {
            JobState::Pending => 0,
            JobState::Running => 1,
            JobState::Completed | JobState::Failed | JobState::Cancelled => 2,
        }
    }

    /// Whether moving from `self` to `next` keeps the state sequence
    /// non-decreasing. Staying in the same state is allowed.
    pub fn can_advance_to(&self, next: JobState) -> bool {
        if *self == next {
            return true;
        }
        !self.is_terminal() && next.rank() > self.rank()
    }
}

/// One recorded state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub state: JobState,
    pub at: DateTime<Utc>,
}

/// A submitted job. Created by the submitter, mutated only through the
/// registry, kept for the final report.
#[derive(Debug, Clone, Serialize)]
pub struct JobHandle {
    pub descriptor: Arc<JobDescriptor>,
    pub remote_job_id: String,
    pub state: JobState,
    /// Last message reported by the remote service or recorded locally.
    pub note: Option<String>,
    pub history: Vec<StateTransition>,
}

impl JobHandle {
    pub fn new(descriptor: Arc<JobDescriptor>, remote_job_id: String) -> Self {
        Self {
            descriptor,
            remote_job_id,
            state: JobState::Pending,
            note: None,
            history: vec![StateTransition {
                state: JobState::Pending,
                at: Utc::now(),
            }],
        }
    }

    pub fn label(&self) -> &str {
        &self.descriptor.label
    }

    pub(crate) fn set_state(&mut self, state: JobState) {
        if self.state != state {
            self.state = state;
            self.history.push(StateTransition {
                state,
                at: Utc::now(),
            });
        }
    }
}
