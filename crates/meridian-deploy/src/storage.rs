//! Artifact staging through S3-compatible object storage.
//!
//! The uploader verifies the target bucket exists and is owned by the
//! caller's account, creating and hardening it when absent, then stages the
//! packaged archive so the control plane can fetch it by bucket and key.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::StorageConfig;
use crate::error::{DeployError, DeployResult};
use crate::identity::IdentityClient;

/// Location of a staged archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedArtifact {
    /// Bucket the archive was staged in.
    pub bucket: String,
    /// Object key within the bucket.
    pub key: String,
    /// Object version, when the bucket has versioning enabled.
    pub version_id: Option<String>,
}

/// Staging seam between the deployment flow and object storage.
#[async_trait]
pub trait ArtifactUploader: Send + Sync {
    /// Stage a local archive and return where it landed.
    async fn upload(
        &self,
        archive_path: &Path,
        bucket: &str,
        key: &str,
    ) -> DeployResult<UploadedArtifact>;
}

/// Generate a unique object key for a function's archive.
///
/// Keys embed a UTC timestamp and, when available, a short commit hash so
/// successive deployments never overwrite each other.
#[must_use]
pub fn generate_artifact_key(function_name: &str, commit_sha: Option<&str>) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%3fZ");
    match commit_sha.filter(|sha| !sha.is_empty()) {
        Some(sha) => {
            // Char-boundary-safe truncation; the sha comes from caller input.
            let short = sha.get(..7).unwrap_or(sha);
            format!("function-deployments/{function_name}/{timestamp}-{short}.zip")
        }
        None => format!("function-deployments/{function_name}/{timestamp}.zip"),
    }
}

/// Validate a bucket name against the S3 naming rules.
///
/// Returns a user-input error spelling out the rules when the name is
/// invalid, since a bad name is always a caller mistake.
pub fn validate_bucket_name(name: &str) -> DeployResult<()> {
    let valid_length = name.len() >= 3 && name.len() <= 63;
    let valid_chars = name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'.');
    let valid_edges = name.starts_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit())
        && name.ends_with(|c: char| c.is_ascii_lowercase() || c.is_ascii_digit());
    let looks_like_ip = name.split('.').count() == 4
        && name.split('.').all(|part| part.parse::<u8>().is_ok());
    let has_adjacent_dots = name.contains("..");
    let forbidden_prefix = name.starts_with("xn--") || name.starts_with("sthree-");
    let forbidden_name = name == "amzn-s3-demo-bucket";

    if valid_length
        && valid_chars
        && valid_edges
        && !looks_like_ip
        && !has_adjacent_dots
        && !forbidden_prefix
        && !forbidden_name
    {
        Ok(())
    } else {
        Err(DeployError::user_input(format!(
            "Invalid bucket name '{name}'. Bucket names must be 3-63 characters, \
             contain only lowercase letters, numbers, dots and hyphens, begin and end \
             with a letter or number, not be formatted as an IP address, and not use \
             reserved prefixes"
        )))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BucketInfo {
    #[serde(default)]
    owner: Option<String>,
}

enum BucketStatus {
    Exists { owner: Option<String> },
    Missing,
}

/// Production uploader backed by S3-compatible storage.
pub struct S3Uploader {
    region: String,
    storage: StorageConfig,
    admin: Client,
    identity: IdentityClient,
}

impl S3Uploader {
    /// Create an uploader from configuration.
    pub fn new(
        region: impl Into<String>,
        storage: StorageConfig,
        identity: IdentityClient,
        user_agent: &str,
    ) -> DeployResult<Self> {
        let admin = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent.to_owned())
            .build()
            .map_err(|e| DeployError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            region: region.into(),
            storage,
            admin,
            identity,
        })
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "{}{path}",
            self.storage.admin_endpoint.trim_end_matches('/')
        )
    }

    async fn bucket_status(&self, bucket: &str) -> DeployResult<BucketStatus> {
        let response = self
            .admin
            .get(self.admin_url(&format!("/v1/buckets/{bucket}")))
            .send()
            .await
            .map_err(|e| {
                DeployError::generic("Failed to check if S3 bucket exists", e.to_string())
            })?;

        match response.status() {
            StatusCode::OK => {
                let info: BucketInfo = response.json().await.map_err(|e| {
                    DeployError::generic("Failed to check if S3 bucket exists", e.to_string())
                })?;
                Ok(BucketStatus::Exists { owner: info.owner })
            }
            StatusCode::NOT_FOUND => Ok(BucketStatus::Missing),
            StatusCode::MOVED_PERMANENTLY => Err(DeployError::user_input(format!(
                "Bucket {bucket} exists in a different region than {}. \
                 Use a bucket in the deployment region.",
                self.region
            ))),
            StatusCode::FORBIDDEN => Err(DeployError::PermissionDenied(format!(
                "Permissions error: not authorised to access bucket {bucket}. Check IAM roles."
            ))),
            status => Err(DeployError::generic(
                "Failed to check if S3 bucket exists",
                format!("unexpected status {status}"),
            )),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> DeployResult<()> {
        validate_bucket_name(bucket)?;

        info!(bucket = %bucket, region = %self.region, "creating S3 bucket");

        let response = self
            .admin
            .put(self.admin_url(&format!("/v1/buckets/{bucket}")))
            .json(&serde_json::json!({ "Region": self.region }))
            .send()
            .await
            .map_err(|e| DeployError::generic("Failed to create S3 bucket", e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::FORBIDDEN => {
                return Err(DeployError::PermissionDenied(format!(
                    "Permissions error: not authorised to create bucket {bucket}. Check IAM roles."
                )));
            }
            status => {
                return Err(DeployError::generic(
                    "Failed to create S3 bucket",
                    format!("unexpected status {status}"),
                ));
            }
        }

        self.harden_bucket(bucket).await;
        Ok(())
    }

    /// Apply security settings to a fresh bucket.
    ///
    /// Failures downgrade to warnings; an imperfectly hardened bucket still
    /// works for staging and the operator can finish the job by hand.
    async fn harden_bucket(&self, bucket: &str) {
        let settings = [
            (
                "public-access-block",
                serde_json::json!({
                    "BlockPublicAcls": true,
                    "BlockPublicPolicy": true,
                    "IgnorePublicAcls": true,
                    "RestrictPublicBuckets": true
                }),
            ),
            (
                "encryption",
                serde_json::json!({ "Algorithm": "AES256" }),
            ),
            ("versioning", serde_json::json!({ "Enabled": true })),
        ];

        let mut applied = 0usize;
        for (setting, body) in &settings {
            let result = self
                .admin
                .put(self.admin_url(&format!("/v1/buckets/{bucket}/{setting}")))
                .json(body)
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => applied += 1,
                Ok(response) => {
                    warn!(bucket = %bucket, setting, status = %response.status(), "failed to apply bucket setting");
                }
                Err(e) => {
                    warn!(bucket = %bucket, setting, error = %e, "failed to apply bucket setting");
                }
            }
        }

        if applied < settings.len() {
            warn!(
                bucket = %bucket,
                applied,
                total = settings.len(),
                "applied partial security settings to new bucket, review its configuration"
            );
        }
    }

    async fn verify_ownership(&self, bucket: &str, owner: Option<&str>) -> DeployResult<()> {
        let Some(account_id) = self.identity.account_id().await else {
            return Err(DeployError::generic(
                "Failed to verify bucket ownership",
                "could not determine the caller's account id".to_owned(),
            ));
        };

        match owner {
            Some(owner) if owner != account_id => Err(DeployError::PermissionDenied(format!(
                "Bucket {bucket} is owned by account {owner}, not the deployment account"
            ))),
            _ => Ok(()),
        }
    }

    fn build_store(&self, bucket: &str) -> DeployResult<impl ObjectStore> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .with_region(&self.region);

        if let Some(endpoint) = &self.storage.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_allow_http(endpoint.starts_with("http://"));
        }
        if let Some(access_key_id) = &self.storage.access_key_id {
            builder = builder.with_access_key_id(access_key_id);
        }
        if let Some(secret) = &self.storage.secret_access_key {
            builder = builder.with_secret_access_key(secret);
        }

        builder
            .build()
            .map_err(|e| DeployError::generic("Failed to create S3 client", e.to_string()))
    }
}

#[async_trait]
impl ArtifactUploader for S3Uploader {
    async fn upload(
        &self,
        archive_path: &Path,
        bucket: &str,
        key: &str,
    ) -> DeployResult<UploadedArtifact> {
        match self.bucket_status(bucket).await? {
            BucketStatus::Exists { owner } => {
                self.verify_ownership(bucket, owner.as_deref()).await?;
            }
            BucketStatus::Missing => {
                info!(bucket = %bucket, "bucket does not exist, creating it");
                self.create_bucket(bucket).await?;
            }
        }

        let data = tokio::fs::read(archive_path)
            .await
            .map_err(|e| DeployError::generic("Failed to read packaged archive", e.to_string()))?;
        let size = data.len();

        let store = self.build_store(bucket)?;
        let path = ObjectPath::parse(key)
            .map_err(|e| DeployError::generic("Invalid S3 key", e.to_string()))?;
        let payload: object_store::PutPayload = Bytes::from(data).into();

        let result = store
            .put(&path, payload)
            .await
            .map_err(|e| DeployError::generic("Failed to upload code to S3", e.to_string()))?;

        info!(bucket = %bucket, key = %key, size_bytes = size, "uploaded code archive");

        Ok(UploadedArtifact {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id: result.version,
        })
    }
}

/// In-memory uploader for tests.
#[derive(Debug, Default)]
pub struct MockUploader {
    uploads: std::sync::Mutex<Vec<(std::path::PathBuf, String, String)>>,
    fail_with: Option<DeployError>,
}

impl MockUploader {
    /// An uploader that fails every upload with `error`.
    #[must_use]
    pub fn failing(error: DeployError) -> Self {
        Self {
            uploads: std::sync::Mutex::new(Vec::new()),
            fail_with: Some(error),
        }
    }

    /// The uploads received so far as `(path, bucket, key)` tuples.
    #[must_use]
    pub fn uploads(&self) -> Vec<(std::path::PathBuf, String, String)> {
        self.uploads.lock().map(|u| u.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ArtifactUploader for MockUploader {
    async fn upload(
        &self,
        archive_path: &Path,
        bucket: &str,
        key: &str,
    ) -> DeployResult<UploadedArtifact> {
        if let Some(error) = &self.fail_with {
            return Err(error.clone());
        }

        if let Ok(mut uploads) = self.uploads.lock() {
            uploads.push((archive_path.to_owned(), bucket.to_owned(), key.to_owned()));
        }

        Ok(UploadedArtifact {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            version_id: None,
        })
    }
}
