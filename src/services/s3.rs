use async_trait::async_trait;
use s3::creds::Credentials;
use s3::{Bucket, Region};
use tokio::io::AsyncWrite;

use crate::models::artifact::{Artifact, RemoteFolder};
use crate::services::storage::{ArtifactStore, CountingWriter, StorageError};

/// S3-compatible storage (AWS, R2, MinIO). Folders are top-level key
/// prefixes; artifacts are the objects directly under them.
pub struct S3ArtifactStore {
    bucket: Box<Bucket>,
}

impl S3ArtifactStore {
    pub fn new(
        bucket_name: &str,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: "auto".to_string(),
            endpoint: endpoint.to_string(),
        };

        let credentials =
            Credentials::new(Some(access_key), Some(secret_key), None, None, None)
                .map_err(|e| StorageError::Config(e.to_string()))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

fn object_title(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[async_trait]
impl ArtifactStore for S3ArtifactStore {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StorageError> {
        let pages = self
            .bucket
            .list(String::new(), Some("/".to_string()))
            .await
            .map_err(StorageError::S3)?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.common_prefixes.unwrap_or_default())
            .filter(|p| p.prefix.trim_end_matches('/') == name)
            .map(|p| RemoteFolder {
                id: p.prefix.clone(),
                name: name.to_string(),
            })
            .collect())
    }

    async fn list(&self, folder: &RemoteFolder) -> Result<Vec<Artifact>, StorageError> {
        let pages = self
            .bucket
            .list(folder.id.clone(), Some("/".to_string()))
            .await
            .map_err(StorageError::S3)?;

        Ok(pages
            .into_iter()
            .flat_map(|page| page.contents)
            .filter(|object| !object.key.ends_with('/'))
            .map(|object| Artifact {
                title: object_title(&object.key).to_string(),
                id: object.key,
                parent_id: folder.id.clone(),
                size: Some(object.size),
            })
            .collect())
    }

    async fn download_to(
        &self,
        artifact: &Artifact,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        let mut counting = CountingWriter::new(writer);
        let status = self
            .bucket
            .get_object_to_writer(&artifact.id, &mut counting)
            .await
            .map_err(StorageError::S3)?;

        if !(200..300).contains(&status) {
            return Err(StorageError::Status {
                status,
                message: format!("GET {} failed", artifact.id),
            });
        }
        Ok(counting.written())
    }

    async fn delete(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let response = self
            .bucket
            .delete_object(&artifact.id)
            .await
            .map_err(StorageError::S3)?;

        let status = response.status_code();
        if !(200..300).contains(&status) {
            return Err(StorageError::Status {
                status,
                message: format!("DELETE {} failed", artifact.id),
            });
        }
        Ok(())
    }
}
