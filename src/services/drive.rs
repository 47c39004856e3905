use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::models::artifact::{Artifact, RemoteFolder};
use crate::services::storage::{ArtifactStore, StorageError};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Client for a Drive v3 style file API.
pub struct DriveClient {
    http: Client,
    base_url: String,
    api_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    /// Drive reports sizes as decimal strings.
    size: Option<String>,
}

impl DriveClient {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    /// Run a files query, following page tokens until exhausted.
    async fn query(&self, q: &str) -> Result<Vec<DriveFile>, StorageError> {
        let url = format!("{}/drive/v3/files", self.base_url);
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(&url)
                .bearer_auth(&self.api_token)
                .query(&[
                    ("q", q),
                    ("fields", "nextPageToken,files(id,name,parents,size)"),
                    ("pageSize", "1000"),
                ]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = request.send().await.map_err(StorageError::Http)?;
            let response = check_status(response).await?;
            let page: FileList = response.json().await.map_err(StorageError::Http)?;

            files.extend(page.files);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StorageError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response.text().await.unwrap_or_default();
    Err(StorageError::Status { status, message })
}

/// Quote a value for use inside a Drive query string literal.
fn quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[async_trait]
impl ArtifactStore for DriveClient {
    async fn find_folders(&self, name: &str) -> Result<Vec<RemoteFolder>, StorageError> {
        let q = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            quote(name),
            FOLDER_MIME
        );
        let files = self.query(&q).await?;

        // The service matches names loosely; keep exact matches only.
        Ok(files
            .into_iter()
            .filter(|f| f.name == name)
            .map(|f| RemoteFolder {
                id: f.id,
                name: f.name,
            })
            .collect())
    }

    async fn list(&self, folder: &RemoteFolder) -> Result<Vec<Artifact>, StorageError> {
        let q = format!(
            "'{}' in parents and mimeType != '{}' and trashed = false",
            quote(&folder.id),
            FOLDER_MIME
        );
        let files = self.query(&q).await?;

        Ok(files
            .into_iter()
            .map(|f| Artifact {
                id: f.id,
                title: f.name,
                parent_id: f.parents.into_iter().next().unwrap_or_else(|| folder.id.clone()),
                size: f.size.and_then(|s| s.parse().ok()),
            })
            .collect())
    }

    async fn download_to(
        &self,
        artifact: &Artifact,
        writer: &mut (dyn AsyncWrite + Send + Unpin),
    ) -> Result<u64, StorageError> {
        let url = format!("{}/drive/v3/files/{}", self.base_url, artifact.id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(&[("alt", "media")])
            .send()
            .await
            .map_err(StorageError::Http)?;
        let mut response = check_status(response).await?;

        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(StorageError::Http)? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;

        Ok(written)
    }

    async fn delete(&self, artifact: &Artifact) -> Result<(), StorageError> {
        let url = format!("{}/drive/v3/files/{}", self.base_url, artifact.id);
        let response = self
            .http
            .delete(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(StorageError::Http)?;
        check_status(response).await?;
        Ok(())
    }
}
