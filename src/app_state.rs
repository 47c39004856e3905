use std::sync::Arc;

use crate::config::{AppConfig, StorageBackend};
use crate::services::{
    compute::{ComputeClient, ComputeService},
    drive::DriveClient,
    s3::S3ArtifactStore,
    storage::{ArtifactStore, StorageError},
};

/// Remote service clients, built once per run and passed to every
/// component that talks to a remote service.
#[derive(Clone)]
pub struct AppState {
    pub compute: Arc<dyn ComputeService>,
    pub storage: Arc<dyn ArtifactStore>,
}

impl AppState {
    pub fn new(compute: Arc<dyn ComputeService>, storage: Arc<dyn ArtifactStore>) -> Self {
        Self { compute, storage }
    }

    /// Build the concrete clients named by the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self, StorageError> {
        let compute = ComputeClient::new(
            &config.compute_api_url,
            &config.compute_project,
            &config.compute_api_token,
        );
        let storage = build_storage(config)?;
        Ok(Self::new(Arc::new(compute), storage))
    }
}

fn build_storage(config: &AppConfig) -> Result<Arc<dyn ArtifactStore>, StorageError> {
    match config.storage_backend {
        StorageBackend::Drive => {
            let token = config
                .drive_api_token
                .as_deref()
                .ok_or_else(|| StorageError::Config("DRIVE_API_TOKEN is not set".to_string()))?;
            Ok(Arc::new(DriveClient::new(&config.drive_api_url, token)))
        }
        StorageBackend::S3 => {
            let required = |value: &Option<String>, name: &str| {
                value
                    .clone()
                    .ok_or_else(|| StorageError::Config(format!("{} is not set", name)))
            };
            let store = S3ArtifactStore::new(
                &required(&config.s3_bucket, "S3_BUCKET")?,
                &required(&config.s3_endpoint, "S3_ENDPOINT")?,
                &required(&config.s3_access_key, "S3_ACCESS_KEY")?,
                &required(&config.s3_secret_key, "S3_SECRET_KEY")?,
            )?;
            Ok(Arc::new(store))
        }
    }
}
