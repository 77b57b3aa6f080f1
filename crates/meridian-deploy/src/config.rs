//! Configuration for meridian-deploy.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

use crate::error::{DeployError, DeployResult};

/// Top-level configuration for the deployment flow.
#[derive(Debug, Clone, Deserialize)]
pub struct DeployConfig {
    /// Region the deployment targets.
    #[serde(default = "default_region")]
    pub region: String,

    /// Function control-plane API configuration.
    #[serde(default)]
    pub api: ApiConfig,

    /// Artifact storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Readiness wait budgets.
    #[serde(default)]
    pub wait: WaitConfig,
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            api: ApiConfig::default(),
            storage: StorageConfig::default(),
            wait: WaitConfig::default(),
        }
    }
}

impl DeployConfig {
    /// Load configuration from the default sources.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. `meridian.toml` in the current directory (if present)
    /// 3. Environment variables with `MERIDIAN_DEPLOY_` prefix
    pub fn load() -> DeployResult<Self> {
        Figment::new()
            .merge(Toml::file("meridian.toml"))
            .merge(Env::prefixed("MERIDIAN_DEPLOY_").split("__"))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }

    /// Load configuration from a specific TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> DeployResult<Self> {
        Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("MERIDIAN_DEPLOY_").split("__"))
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }
}

/// Function control-plane API configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL for the function API.
    #[serde(default = "default_api_endpoint")]
    pub endpoint: String,

    /// Bearer token for authenticated calls.
    pub token: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_api_timeout_secs")]
    pub timeout_secs: u64,

    /// User-agent header sent on every call.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_api_endpoint() -> String {
    "http://localhost:9001".to_owned()
}

const fn default_api_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    concat!("meridian-deploy/", env!("CARGO_PKG_VERSION")).to_owned()
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            endpoint: default_api_endpoint(),
            token: None,
            timeout_secs: default_api_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

/// Artifact storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base URL for the bucket administration API.
    #[serde(default = "default_admin_endpoint")]
    pub admin_endpoint: String,

    /// S3 endpoint URL (for S3-compatible stores like Garage).
    pub endpoint: Option<String>,

    /// S3 access key ID.
    pub access_key_id: Option<String>,

    /// S3 secret access key.
    pub secret_access_key: Option<String>,
}

fn default_admin_endpoint() -> String {
    "http://localhost:9002".to_owned()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            admin_endpoint: default_admin_endpoint(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
        }
    }
}

/// Readiness wait budgets.
#[derive(Debug, Clone, Deserialize)]
pub struct WaitConfig {
    /// Minutes to wait for a created function to become active.
    #[serde(default = "default_wait_minutes")]
    pub active_minutes: u64,

    /// Minutes to wait for an in-flight update to settle.
    #[serde(default = "default_wait_minutes")]
    pub update_minutes: u64,
}

const fn default_wait_minutes() -> u64 {
    5
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            active_minutes: default_wait_minutes(),
            update_minutes: default_wait_minutes(),
        }
    }
}
