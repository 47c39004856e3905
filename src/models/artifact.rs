use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::models::descriptor::Season;

/// A folder in remote storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteFolder {
    pub id: String,
    pub name: String,
}

/// A file found in remote storage during a retrieval pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub id: String,
    /// Filename as shown by the storage service.
    pub title: String,
    pub parent_id: String,
    /// Byte size when the storage service reports it.
    pub size: Option<u64>,
}

/// Local destination derived from an artifact's filename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ArtifactLabel {
    Seasonal { season: Season, year: String },
    Unknown,
}

impl ArtifactLabel {
    pub fn dir_name(&self) -> String {
        match self {
            ArtifactLabel::Seasonal { season, year } => format!("{}_{}", season.label(), year),
            ArtifactLabel::Unknown => "unknown".to_string(),
        }
    }
}

impl fmt::Display for ArtifactLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dir_name())
    }
}

/// Returned when a delete is recorded for an artifact that was never
/// downloaded.
#[derive(Debug, thiserror::Error)]
#[error("remote delete recorded for '{0}' before a verified download")]
pub struct DeleteBeforeDownload(pub String);

/// Outcome of retrieving one artifact.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalRecord {
    pub artifact: Artifact,
    pub label: ArtifactLabel,
    pub local_path: PathBuf,
    downloaded: bool,
    remote_deleted: bool,
    pub bytes: u64,
    pub error: Option<String>,
    /// Set when cancellation stopped work on this artifact.
    pub skipped: bool,
}

impl RetrievalRecord {
    pub fn new(artifact: Artifact, label: ArtifactLabel, local_path: PathBuf) -> Self {
        Self {
            artifact,
            label,
            local_path,
            downloaded: false,
            remote_deleted: false,
            bytes: 0,
            error: None,
            skipped: false,
        }
    }

    pub fn downloaded(&self) -> bool {
        self.downloaded
    }

    pub fn remote_deleted(&self) -> bool {
        self.remote_deleted
    }

    pub fn mark_downloaded(&mut self, bytes: u64) {
        self.downloaded = true;
        self.bytes = bytes;
    }

    /// Only a downloaded record may be marked deleted.
    pub fn mark_remote_deleted(&mut self) -> Result<(), DeleteBeforeDownload> {
        if !self.downloaded {
            return Err(DeleteBeforeDownload(self.artifact.title.clone()));
        }
        self.remote_deleted = true;
        Ok(())
    }

    /// Downloaded locally but still present remotely.
    pub fn is_orphan(&self) -> bool {
        self.downloaded && !self.remote_deleted
    }
}
