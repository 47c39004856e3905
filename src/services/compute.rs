use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::models::descriptor::JobDescriptor;
use crate::models::job::JobState;

/// Status reported by the compute service for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteStatus {
    pub state: JobState,
    pub message: Option<String>,
}

impl RemoteStatus {
    pub fn new(state: JobState) -> Self {
        Self {
            state,
            message: None,
        }
    }
}

/// Remote compute capability: start an export, ask for its state.
#[async_trait]
pub trait ComputeService: Send + Sync {
    /// Start one export job and return the service's job id.
    async fn submit(&self, descriptor: &JobDescriptor) -> Result<String, ComputeError>;

    async fn status(&self, remote_job_id: &str) -> Result<RemoteStatus, ComputeError>;
}

/// Client for an operations-style export REST API.
///
/// Exports are started with `POST {base}/v1/projects/{project}/exports`
/// and tracked as long-running operations at `GET {base}/v1/{name}`.
pub struct ComputeClient {
    http: Client,
    base_url: String,
    project: String,
    api_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportRequest<'a> {
    description: &'a str,
    product: &'a str,
    dataset: &'a str,
    region: RegionSpec<'a>,
    start_date: String,
    end_date: String,
    file_export_options: FileExportOptions<'a>,
    scale: f64,
    max_pixels: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RegionSpec<'a> {
    asset_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FileExportOptions<'a> {
    file_format: &'static str,
    drive_destination: DriveDestination<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DriveDestination<'a> {
    folder: &'a str,
    filename_prefix: &'a str,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    metadata: Option<OperationMetadata>,
    #[serde(default)]
    error: Option<OperationError>,
}

#[derive(Deserialize)]
struct OperationMetadata {
    state: String,
}

#[derive(Deserialize)]
struct OperationError {
    message: String,
}

impl ComputeClient {
    pub fn new(base_url: &str, project: &str, api_token: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            project: project.to_string(),
            api_token: api_token.to_string(),
        }
    }

    async fn rejected(response: reqwest::Response) -> ComputeError {
        let status = response.status();
        let message = response.text().await.unwrap_or_default();
        if status == StatusCode::TOO_MANY_REQUESTS {
            ComputeError::QuotaExceeded(message)
        } else {
            ComputeError::Rejected {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl ComputeService for ComputeClient {
    async fn submit(&self, descriptor: &JobDescriptor) -> Result<String, ComputeError> {
        let url = format!("{}/v1/projects/{}/exports", self.base_url, self.project);

        let body = ExportRequest {
            description: &descriptor.label,
            product: &descriptor.product,
            dataset: &descriptor.dataset,
            region: RegionSpec {
                asset_id: &descriptor.region.asset_id,
                filter: descriptor.region.filter.as_deref(),
            },
            start_date: descriptor.window.start.to_string(),
            end_date: descriptor.window.end.to_string(),
            file_export_options: FileExportOptions {
                file_format: "GEO_TIFF",
                drive_destination: DriveDestination {
                    folder: &descriptor.folder,
                    filename_prefix: &descriptor.filename_prefix,
                },
            },
            scale: descriptor.resolution,
            max_pixels: descriptor.max_pixels,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&body)
            .send()
            .await
            .map_err(ComputeError::Http)?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let operation: Operation = response.json().await.map_err(ComputeError::Http)?;
        Ok(operation.name)
    }

    async fn status(&self, remote_job_id: &str) -> Result<RemoteStatus, ComputeError> {
        let url = format!("{}/v1/{}", self.base_url, remote_job_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_token)
            .send()
            .await
            .map_err(ComputeError::Http)?;

        if !response.status().is_success() {
            return Err(Self::rejected(response).await);
        }

        let operation: Operation = response.json().await.map_err(ComputeError::Http)?;
        let raw = operation
            .metadata
            .map(|m| m.state)
            .ok_or_else(|| ComputeError::MissingState(operation.name.clone()))?;

        Ok(RemoteStatus {
            state: parse_remote_state(&raw)?,
            message: operation.error.map(|e| e.message),
        })
    }
}

/// Map the service's state spelling onto [`JobState`].
pub fn parse_remote_state(raw: &str) -> Result<JobState, ComputeError> {
    match raw.to_ascii_uppercase().as_str() {
        "PENDING" | "READY" | "UNSUBMITTED" => Ok(JobState::Pending),
        // A cancel in progress is still running until the service says otherwise.
        "RUNNING" | "CANCELLING" | "CANCEL_REQUESTED" => Ok(JobState::Running),
        "SUCCEEDED" | "COMPLETED" => Ok(JobState::Completed),
        "FAILED" => Ok(JobState::Failed),
        "CANCELLED" => Ok(JobState::Cancelled),
        _ => Err(ComputeError::UnknownState(raw.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("Operation {0} has no state")]
    MissingState(String),

    #[error("Unrecognized job state '{0}'")]
    UnknownState(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_remote_state() {
        assert_eq!(parse_remote_state("PENDING").unwrap(), JobState::Pending);
        assert_eq!(parse_remote_state("READY").unwrap(), JobState::Pending);
        assert_eq!(parse_remote_state("running").unwrap(), JobState::Running);
        assert_eq!(parse_remote_state("CANCELLING").unwrap(), JobState::Running);
        assert_eq!(parse_remote_state("SUCCEEDED").unwrap(), JobState::Completed);
        assert_eq!(parse_remote_state("COMPLETED").unwrap(), JobState::Completed);
        assert_eq!(parse_remote_state("FAILED").unwrap(), JobState::Failed);
        assert_eq!(parse_remote_state("CANCELLED").unwrap(), JobState::Cancelled);
    }

    #[test]
    fn test_unknown_state_is_error() {
        assert!(matches!(
            parse_remote_state("EXPLODED"),
            Err(ComputeError::UnknownState(s)) if s == "EXPLODED"
        ));
    }
}
