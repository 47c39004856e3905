use serde::Deserialize;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::descriptor::{Region, Season};
use crate::services::classify::ClassificationRule;
use crate::services::orchestrator::RunSettings;
use crate::services::planner::ExportPlan;
use crate::services::poller::PollSettings;
use crate::services::retriever::RetrievalSettings;

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Drive,
    S3,
}

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// First year to export (inclusive)
    pub start_year: i32,

    /// Last year to export (inclusive)
    pub end_year: i32,

    /// Season windows to export each year, e.g. "annual,jja"
    #[serde(default = "default_seasons")]
    pub seasons: Vec<Season>,

    /// Products computed by the remote service, e.g. "ndvi,ndbi"
    #[serde(default = "default_products")]
    pub products: Vec<String>,

    /// Source collection id passed through to the compute service
    #[serde(default = "default_dataset")]
    pub dataset: String,

    #[serde(default = "default_region_asset")]
    pub region_asset: String,

    /// `property=value` filter on the region collection; empty disables it
    #[serde(default = "default_region_filter")]
    pub region_filter: Option<String>,

    /// Short region tag used in filenames
    #[serde(default = "default_region_tag")]
    pub region_tag: String,

    /// Remote folder exports are written into and retrieved from
    pub remote_folder: String,

    /// Root of the local archive
    pub local_root: PathBuf,

    /// Export resolution in ground units per pixel
    #[serde(default = "default_resolution")]
    pub resolution: f64,

    /// Maximum pixels per export
    #[serde(default = "default_max_pixels")]
    pub max_pixels: u64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Consecutive status errors before a job is marked failed
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    #[serde(default = "default_concurrency")]
    pub poll_concurrency: usize,

    #[serde(default = "default_concurrency")]
    pub transfer_concurrency: usize,

    /// Stop waiting for jobs after this many seconds
    pub run_timeout_secs: Option<u64>,

    /// Season tags recognized in exported filenames, in precedence order
    #[serde(default = "default_season_tags")]
    pub season_tags: Vec<Season>,

    #[serde(default = "default_export_extension")]
    pub export_extension: String,

    #[serde(default = "default_compute_api_url")]
    pub compute_api_url: String,

    /// Project the export jobs are billed to
    pub compute_project: String,

    /// Bearer token for the compute service
    pub compute_api_token: String,

    #[serde(default = "default_storage_backend")]
    pub storage_backend: StorageBackend,

    #[serde(default = "default_drive_api_url")]
    pub drive_api_url: String,

    /// Bearer token for the Drive API (drive backend)
    pub drive_api_token: Option<String>,

    /// S3 bucket name (s3 backend)
    pub s3_bucket: Option<String>,

    /// S3 endpoint URL (s3 backend)
    pub s3_endpoint: Option<String>,

    pub s3_access_key: Option<String>,

    pub s3_secret_key: Option<String>,

    /// Write the JSON run report here
    pub report_path: Option<PathBuf>,

    /// Serve Prometheus metrics on this address
    pub metrics_addr: Option<SocketAddr>,
}

fn default_seasons() -> Vec<Season> {
    vec![Season::Annual, Season::Jja]
}

fn default_products() -> Vec<String> {
    vec!["ndvi".to_string()]
}

fn default_dataset() -> String {
    "MODIS/061/MOD13Q1".to_string()
}

fn default_region_asset() -> String {
    "USDOS/LSIB_SIMPLE/2017".to_string()
}

fn default_region_filter() -> Option<String> {
    Some("country_na=United States".to_string())
}

fn default_region_tag() -> String {
    "us".to_string()
}

fn default_resolution() -> f64 {
    250.0
}

fn default_max_pixels() -> u64 {
    10_000_000_000_000
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_max_poll_failures() -> u32 {
    5
}

fn default_concurrency() -> usize {
    4
}

fn default_season_tags() -> Vec<Season> {
    vec![Season::Jja, Season::Annual, Season::Summer]
}

fn default_export_extension() -> String {
    ".tif".to_string()
}

fn default_compute_api_url() -> String {
    "https://earthengine.googleapis.com".to_string()
}

fn default_storage_backend() -> StorageBackend {
    StorageBackend::Drive
}

fn default_drive_api_url() -> String {
    "https://www.googleapis.com".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let config: Self = envy::from_env()?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings the rest of the crate assumes are sane.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.start_year > self.end_year {
            return Err(ConfigError::Invalid(format!(
                "START_YEAR {} is after END_YEAR {}",
                self.start_year, self.end_year
            )));
        }
        if self.products.iter().any(|p| p.trim().is_empty()) {
            return Err(ConfigError::Invalid("PRODUCTS contains an empty name".to_string()));
        }
        if self.seasons.is_empty() {
            return Err(ConfigError::Invalid("SEASONS is empty".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid("POLL_INTERVAL_SECS must be positive".to_string()));
        }
        if self.poll_concurrency == 0 || self.transfer_concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency limits must be positive".to_string()));
        }
        if !self.export_extension.starts_with('.') {
            return Err(ConfigError::Invalid(format!(
                "EXPORT_EXTENSION '{}' must start with '.'",
                self.export_extension
            )));
        }
        Ok(())
    }

    pub fn export_plan(&self) -> ExportPlan {
        ExportPlan {
            start_year: self.start_year,
            end_year: self.end_year,
            products: self.products.iter().map(|p| p.trim().to_string()).collect(),
            seasons: self.seasons.clone(),
            dataset: self.dataset.clone(),
            region: Region {
                asset_id: self.region_asset.clone(),
                filter: self
                    .region_filter
                    .as_deref()
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(str::to_string),
                tag: self.region_tag.clone(),
            },
            folder: self.remote_folder.clone(),
            resolution: self.resolution,
            max_pixels: self.max_pixels,
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_consecutive_failures: self.max_poll_failures,
            concurrency: self.poll_concurrency,
            deadline: self.run_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn retrieval_settings(&self) -> RetrievalSettings {
        RetrievalSettings {
            local_root: self.local_root.clone(),
            extension: self.export_extension.clone(),
            concurrency: self.transfer_concurrency,
        }
    }

    pub fn classification_rule(&self) -> ClassificationRule {
        ClassificationRule::new(self.season_tags.clone())
    }

    pub fn run_settings(&self) -> RunSettings {
        RunSettings {
            folder: self.remote_folder.clone(),
            poll: self.poll_settings(),
            retrieval: self.retrieval_settings(),
            rule: self.classification_rule(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read configuration from environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
