//! In-memory compute and storage services for driving a run end to end

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use raster_export_sync::{
    app_state::AppState,
    models::artifact::{Artifact, RemoteFolder},
    models::descriptor::{JobDescriptor, Region, Season},
    models::job::JobState,
    services::{
        classify::ClassificationRule,
        compute::{ComputeError, ComputeService, RemoteStatus},
        orchestrator::RunSettings,
        planner::ExportPlan,
        poller::PollSettings,
        retriever::RetrievalSettings,
        storage::{ArtifactStore, StorageError},
    },
};

pub const FOLDER: &str = "US_MODIS_NDVI";

/// One scripted answer to a status request.
#[derive(Debug, Clone)]
pub enum Step {
    State(JobState),
    Failed(String),
    Error,
}

/// Compute service answering status requests from per-label scripts.
/// The last step of a script repeats forever.
#[derive(Default)]
pub struct FakeCompute {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    rejected: HashSet<String>,
    submitted: Mutex<Vec<String>>,
    status_calls: Mutex<HashMap<String, usize>>,
}

impl FakeCompute {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, label: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(label.to_string(), steps.into());
        self
    }

    pub fn reject(mut self, label: &str) -> Self {
        self.rejected.insert(label.to_string());
        self
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn status_calls(&self, label: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(label)
            .copied()
            .unwrap_or_default()
    }
}

fn job_id(label: &str) -> String {
    format!("projects/test/operations/{}", label)
}

#[async_trait]
impl ComputeService for FakeCompute {
    async fn submit(&self, descriptor: &JobDescriptor) -> Result<String, ComputeError> {
        if self.rejected.contains(&descriptor.label) {
            return Err(ComputeError::QuotaExceeded("too many concurrent exports".to_string()));
        }
        self.submitted.lock().unwrap().push(descriptor.label.clone());
        Ok(job_id(&descriptor.label))
    }

    async fn status(&self, remote_job_id: &str) -> Result<RemoteStatus, ComputeError> {
        let label = remote_job_id
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(label.clone())
            .or_default() += 1;

        let step = {
            let mut scripts = self.scripts.lock().unwrap();
            let script = scripts.entry(label).or_default();
            if script.len() > 1 {
                script.pop_front()
            } else {
                script.front().cloned()
            }
        };

        match step.unwrap_or(Step::State(JobState::Completed)) {
            Step::State(state) => Ok(RemoteStatus::new(state)),
            Step::Failed(message) => Ok(RemoteStatus {
                state: JobState::Failed,
                message: Some(message),
            }),
            Step::Error => Err(ComputeError::Rejected {
                status: 503,
                message: "backend unavailable".to_string(),
            }),
        }
    }
}

#[derive(Clone)]
struct StoredFile {
    artifact: Artifact,
    bytes: Vec<u8>,
}

/// Storage service holding files in memory.
#[derive(Default)]
pub struct FakeStore {
    folders: Vec<RemoteFolder>,
    files: Mutex<Vec<StoredFile>>,
    fail_download: HashSet<String>,
    fail_delete: HashSet<String>,
    cancel_after_download: Option<CancellationToken>,
    downloads: Mutex<Vec<String>>,
    deletes: Mutex<Vec<String>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn folder(mut self, id: &str, name: &str) -> Self {
        self.folders.push(RemoteFolder {
            id: id.to_string(),
            name: name.to_string(),
        });
        self
    }

    /// Add a file to the first folder, reporting its true size.
    pub fn file(self, title: &str, bytes: &[u8]) -> Self {
        let size = bytes.len() as u64;
        self.file_with_size(title, bytes, Some(size))
    }

    pub fn file_with_size(self, title: &str, bytes: &[u8], size: Option<u64>) -> Self {
        let parent_id = self
            .folders
            .first()
            .map(|f| f.id.clone())
            .unwrap_or_default();
        let id = format!("file-{}", self.files.lock().unwrap().len());
        self.files.lock().unwrap().push(StoredFile {
            artifact: Artifact {
                id,
                title: title.to_string(),
                parent_id,
                size,
            },
            bytes: bytes.to_vec(),
        });
        self
    }

    pub fn failing_download(mut self, title: &str) -> Self {
        self.fail_download.insert(title.to_string());
        self
    }

    pub fn failing_delete(mut self, title: &str) -> Self {
        self.fail_delete.insert(title.to_string());
        self
    }

    /// Cancel `token` once a download has delivered all of its bytes.
    pub fn cancelling_after_download(mut self, token: CancellationToken) -> Self {
        self.cancel_after_download = Some(token);
        self
    }

    /// Bytes held remotely for the artifact with this id.
    pub fn bytes_of(&self, id: &str) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.artifact.id == id)
            .map(|f| f.bytes.clone())
    }

    pub fn remaining(&self) -> Vec<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .map(|f| f.artifact.title.clone())
            .collect()
    }

    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactStore for FakeStore {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StorageError> {
        Ok(self
            .folders
            .iter()
            .filter(|f| f.name == name)
            .cloned()
            .collect())
    }

    async fn list(&self, folder: &RemoteFolder) -> Result<Vec<Artifact>, StorageError> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.artifact.parent_id == folder.id)
            .map(|f| f.artifact.clone())
            .collect())
    }

    async fn download_to(
        &self,
        artifact: &Artifact,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        self.downloads.lock().unwrap().push(artifact.title.clone());
        let bytes = self
            .files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.artifact.id == artifact.id)
            .map(|f| f.bytes.clone())
            .ok_or_else(|| StorageError::Status {
                status: 404,
                message: format!("{} not found", artifact.id),
            })?;

        if self.fail_download.contains(&artifact.title) {
            // Part of the body arrives before the connection drops
            let half = bytes.len() / 2;
            writer.write_all(&bytes[..half]).await?;
            return Err(StorageError::Status {
                status: 502,
                message: "connection reset".to_string(),
            });
        }

        writer.write_all(&bytes).await?;
        if let Some(token) = &self.cancel_after_download {
            token.cancel();
        }
        Ok(bytes.len() as u64)
    }

    async fn delete(&self, artifact: &Artifact) -> Result<(), StorageError> {
        self.deletes.lock().unwrap().push(artifact.title.clone());
        if self.fail_delete.contains(&artifact.title) {
            return Err(StorageError::Status {
                status: 403,
                message: "insufficient permissions".to_string(),
            });
        }
        self.files
            .lock()
            .unwrap()
            .retain(|f| f.artifact.id != artifact.id);
        Ok(())
    }
}

pub fn state(compute: Arc<FakeCompute>, store: Arc<FakeStore>) -> AppState {
    AppState::new(compute, store)
}

/// NDVI exports over the US for the given years and seasons.
pub fn plan(start_year: i32, end_year: i32, seasons: Vec<Season>) -> ExportPlan {
    ExportPlan {
        start_year,
        end_year,
        products: vec!["ndvi".to_string()],
        seasons,
        dataset: "MODIS/061/MOD13Q1".to_string(),
        region: Region {
            asset_id: "USDOS/LSIB_SIMPLE/2017".to_string(),
            filter: Some("country_na=United States".to_string()),
            tag: "us".to_string(),
        },
        folder: FOLDER.to_string(),
        resolution: 250.0,
        max_pixels: 10_000_000_000_000,
    }
}

pub fn retrieval_settings(root: &Path) -> RetrievalSettings {
    RetrievalSettings {
        local_root: root.to_path_buf(),
        extension: ".tif".to_string(),
        concurrency: 2,
    }
}

/// Settings with a short poll interval so scripted runs finish quickly.
pub fn run_settings(root: &Path) -> RunSettings {
    RunSettings {
        folder: FOLDER.to_string(),
        poll: PollSettings {
            interval: Duration::from_millis(10),
            max_consecutive_failures: 3,
            concurrency: 2,
            deadline: None,
        },
        retrieval: retrieval_settings(root),
        rule: ClassificationRule::default(),
    }
}
