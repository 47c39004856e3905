use futures::stream::{self, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::models::artifact::{Artifact, ArtifactLabel, RetrievalRecord};
use crate::services::classify::{matches_expected, ClassificationRule};
use crate::services::storage::{ArtifactStore, StorageError};

#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    /// Root of the local archive; one sub-directory per label.
    pub local_root: PathBuf,
    /// Extension of exported files, e.g. ".tif".
    pub extension: String,
    /// Artifacts processed at once.
    pub concurrency: usize,
}

/// Downloads matching artifacts into the local archive and removes the
/// remote copies that were retrieved intact.
pub struct ArtifactRetriever {
    store: Arc<dyn ArtifactStore>,
    rule: ClassificationRule,
    settings: RetrievalSettings,
}

impl ArtifactRetriever {
    pub fn new(
        store: Arc<dyn ArtifactStore>,
        rule: ClassificationRule,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            store,
            rule,
            settings,
        }
    }

    /// Create the directory for `label` under the local root. Existing
    /// directories are accepted.
    pub async fn ensure_label_dir(&self, label: &ArtifactLabel) -> Result<PathBuf, DownloadError> {
        let dir = self.settings.local_root.join(label.dir_name());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| DownloadError::LocalDirectory {
                path: dir.clone(),
                source,
            })?;
        Ok(dir)
    }

    /// Process every artifact the run expects (`None`: every artifact with
    /// the export extension). Artifacts run concurrently up to the
    /// configured limit; each one is downloaded before its delete is
    /// considered. Records come back in listing order.
    pub async fn retrieve_all(
        &self,
        artifacts: Vec<Artifact>,
        expected_prefixes: Option<&[String]>,
        cancel: &CancellationToken,
    ) -> Vec<RetrievalRecord> {
        let selected: Vec<Artifact> = artifacts
            .into_iter()
            .filter(|a| {
                let keep = matches_expected(&a.title, &self.settings.extension, expected_prefixes);
                if !keep {
                    tracing::debug!(title = %a.title, "Skipping artifact not produced by this run");
                }
                keep
            })
            .collect();

        tracing::info!(count = selected.len(), "Retrieving artifacts");

        stream::iter(selected)
            .map(|artifact| self.retrieve_one(artifact, cancel))
            .buffered(self.settings.concurrency.max(1))
            .collect()
            .await
    }

    pub async fn retrieve_one(
        &self,
        artifact: Artifact,
        cancel: &CancellationToken,
    ) -> RetrievalRecord {
        let label = self.rule.classify(&artifact.title);
        let file_name = safe_file_name(&artifact.title);
        let local_path = match file_name {
            Some(name) => self.settings.local_root.join(label.dir_name()).join(name),
            None => PathBuf::new(),
        };
        let mut record = RetrievalRecord::new(artifact, label, local_path);

        if cancel.is_cancelled() {
            record.skipped = true;
            return record;
        }

        let title = record.artifact.title.clone();
        tracing::info!(title = %title, label = %record.label, "Downloading artifact");

        match self.download(&record.artifact, &record.label).await {
            Ok((bytes, path)) => {
                metrics::counter!("artifacts_downloaded").increment(1);
                tracing::info!(title = %title, bytes, path = %path.display(), "Artifact downloaded");
                record.local_path = path;
                record.mark_downloaded(bytes);
            }
            Err(e) => {
                metrics::counter!("artifacts_download_failed").increment(1);
                tracing::error!(title = %title, error = %e, "Download failed, remote copy kept");
                record.error = Some(e.to_string());
                return record;
            }
        }

        if cancel.is_cancelled() {
            tracing::warn!(title = %title, "Cancelled before remote delete, remote copy kept");
            record.skipped = true;
            record.error = Some("run cancelled before remote delete, remote copy kept".to_string());
            return record;
        }

        match self.store.delete(&record.artifact).await {
            Ok(()) => {
                if let Err(e) = record.mark_remote_deleted() {
                    tracing::error!(title = %title, error = %e, "Inconsistent retrieval record");
                } else {
                    tracing::info!(title = %title, "Remote copy deleted");
                }
            }
            Err(source) => {
                let orphan = OrphanArtifactError {
                    title: title.clone(),
                    remote_id: record.artifact.id.clone(),
                    source,
                };
                metrics::counter!("artifacts_orphaned").increment(1);
                tracing::warn!(
                    title = %title,
                    remote_id = %orphan.remote_id,
                    error = %orphan,
                    "Remote delete failed, artifact left orphaned"
                );
                record.error = Some(orphan.to_string());
            }
        }

        record
    }

    /// Stream the artifact into a partial file keyed by its remote id,
    /// verify it, then link it into place. An existing local file is
    /// never replaced: a second artifact with the same title lands in
    /// `<stem>__<id><ext>`, and if that is taken too the download fails.
    /// The partial file is always removed.
    async fn download(
        &self,
        artifact: &Artifact,
        label: &ArtifactLabel,
    ) -> Result<(u64, PathBuf), DownloadError> {
        let file_name = safe_file_name(&artifact.title)
            .ok_or_else(|| DownloadError::UnsafeTitle(artifact.title.clone()))?;
        let dir = self.ensure_label_dir(label).await?;
        let id = id_tag(&artifact.id);
        let part = dir.join(format!("{}.{}.part", file_name, id));

        let result = match self.write_verified(artifact, &part).await {
            Ok(bytes) => claim_destination(artifact, &part, &dir, file_name, &id)
                .await
                .map(|path| (bytes, path)),
            Err(e) => Err(e),
        };

        if let Err(e) = tokio::fs::remove_file(&part).await {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!(path = %part.display(), error = %e, "Could not remove partial download");
            }
        }
        result
    }

    async fn write_verified(&self, artifact: &Artifact, part: &Path) -> Result<u64, DownloadError> {
        let local_write = |source: io::Error| DownloadError::LocalWrite {
            path: part.to_path_buf(),
            source,
        };

        let mut file = tokio::fs::File::create(part).await.map_err(local_write)?;
        let bytes = self
            .store
            .download_to(artifact, &mut file)
            .await
            .map_err(|source| match source {
                StorageError::Io(e) => local_write(e),
                source => DownloadError::Transfer {
                    title: artifact.title.clone(),
                    source,
                },
            })?;
        file.flush().await.map_err(local_write)?;
        file.sync_all().await.map_err(local_write)?;
        drop(file);

        verify_transfer(&artifact.title, bytes, artifact.size)?;
        Ok(bytes)
    }
}

/// Hard-link the verified partial file to the first free destination.
/// Linking fails on an existing path, so two artifacts can never claim
/// the same file.
async fn claim_destination(
    artifact: &Artifact,
    part: &Path,
    dir: &Path,
    file_name: &str,
    id: &str,
) -> Result<PathBuf, DownloadError> {
    let primary = dir.join(file_name);
    for candidate in [primary.clone(), dir.join(alternate_name(file_name, id))] {
        match tokio::fs::hard_link(part, &candidate).await {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::warn!(path = %candidate.display(), "Local file exists, not replacing it");
            }
            Err(source) => {
                return Err(DownloadError::LocalWrite {
                    path: candidate,
                    source,
                })
            }
        }
    }
    Err(DownloadError::AlreadyExists {
        title: artifact.title.clone(),
        path: primary,
    })
}

/// Remote id reduced to characters safe in a file name.
fn id_tag(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// `<stem>__<id><ext>`
fn alternate_name(file_name: &str, id: &str) -> String {
    match file_name.rfind('.') {
        Some(i) if i > 0 => format!("{}__{}{}", &file_name[..i], id, &file_name[i..]),
        _ => format!("{}__{}", file_name, id),
    }
}

/// A download counts only when bytes arrived and, if the remote size is
/// known, all of them arrived.
fn verify_transfer(title: &str, bytes: u64, expected: Option<u64>) -> Result<(), DownloadError> {
    if bytes == 0 {
        return Err(DownloadError::Incomplete {
            title: title.to_string(),
            reason: "no bytes received".to_string(),
        });
    }
    if let Some(expected) = expected {
        if bytes != expected {
            return Err(DownloadError::Incomplete {
                title: title.to_string(),
                reason: format!("received {} of {} bytes", bytes, expected),
            });
        }
    }
    Ok(())
}

/// The title as a bare file name, or `None` if it would escape the
/// label directory.
fn safe_file_name(title: &str) -> Option<&str> {
    let name = Path::new(title).file_name()?.to_str()?;
    (name == title).then_some(name)
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Transfer of '{title}' failed: {source}")]
    Transfer {
        title: String,
        #[source]
        source: StorageError,
    },

    #[error("Transfer of '{title}' incomplete: {reason}")]
    Incomplete { title: String, reason: String },

    #[error("Cannot write {path}: {source}")]
    LocalWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create directory {path}: {source}")]
    LocalDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Artifact title '{0}' is not a plain file name")]
    UnsafeTitle(String),

    #[error("Local copy of '{title}' already exists at {path}")]
    AlreadyExists { title: String, path: PathBuf },
}

/// Downloaded locally, but the remote copy could not be removed.
#[derive(Debug, thiserror::Error)]
#[error("'{title}' downloaded but remote copy {remote_id} was not deleted: {source}")]
pub struct OrphanArtifactError {
    pub title: String,
    pub remote_id: String,
    #[source]
    pub source: StorageError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[test]
    fn test_verify_transfer() {
        assert_ok!(verify_transfer("a.tif", 10, Some(10)));
        assert_ok!(verify_transfer("a.tif", 10, None));
        assert!(matches!(
            verify_transfer("a.tif", 0, None),
            Err(DownloadError::Incomplete { .. })
        ));
        assert!(matches!(
            verify_transfer("a.tif", 9, Some(10)),
            Err(DownloadError::Incomplete { .. })
        ));
    }

    #[test]
    fn test_alternate_name_keeps_extension() {
        assert_eq!(
            alternate_name("ndvi_jja_2021_us.tif", &id_tag("1AbC")),
            "ndvi_jja_2021_us__1AbC.tif"
        );
        assert_eq!(
            alternate_name("ndvi.tif", &id_tag("US_NDVI/ndvi.tif")),
            "ndvi__US_NDVI_ndvi_tif.tif"
        );
        assert_eq!(alternate_name("README", "f-1"), "README__f-1");
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("ndvi_2021.tif"), Some("ndvi_2021.tif"));
        assert_eq!(safe_file_name("../escape.tif"), None);
        assert_eq!(safe_file_name("nested/file.tif"), None);
        assert_eq!(safe_file_name(".."), None);
        assert_eq!(safe_file_name(""), None);
    }
}
