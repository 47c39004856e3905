use std::sync::Arc;

use crate::models::artifact::{Artifact, RemoteFolder};
use crate::services::storage::{ArtifactStore, StorageError};

/// Enumerates the artifacts in a named remote folder.
pub struct ArtifactLister {
    store: Arc<dyn ArtifactStore>,
}

impl ArtifactLister {
    pub fn new(store: Arc<dyn ArtifactStore>) -> Self {
        Self { store }
    }

    /// Resolve `name` to exactly one folder.
    pub async fn resolve_folder(&self, name: &str) -> Result<RemoteFolder, ListError> {
        let mut folders = self.store.find_folders(name).await?;
        match folders.len() {
            0 => Err(ListError::FolderNotFound(name.to_string())),
            1 => Ok(folders.remove(0)),
            n => Err(ListError::AmbiguousFolder {
                name: name.to_string(),
                ids: folders.into_iter().map(|f| f.id).collect(),
                count: n,
            }),
        }
    }

    pub async fn list(&self, folder_name: &str) -> Result<Vec<Artifact>, ListError> {
        let folder = self.resolve_folder(folder_name).await?;
        let artifacts = self.store.list(&folder).await?;
        tracing::info!(
            folder = %folder.name,
            folder_id = %folder.id,
            count = artifacts.len(),
            "Listed remote artifacts"
        );
        Ok(artifacts)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("Remote folder '{0}' not found")]
    FolderNotFound(String),

    #[error("Remote folder name '{name}' is ambiguous: {count} folders match ({ids:?})")]
    AmbiguousFolder {
        name: String,
        ids: Vec<String>,
        count: usize,
    },

    #[error("Listing failed: {0}")]
    Storage(#[from] StorageError),
}
