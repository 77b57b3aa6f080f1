//! Core types for meridian-deploy.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{DeployError, DeployResult};

/// The two mutually exclusive code-delivery mechanisms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PackageKind {
    /// Code shipped as a compressed archive (inline or via object storage).
    Zip,
    /// Code shipped as a container image reference.
    Image,
}

impl PackageKind {
    /// Get the kind name as used on the wire.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Zip => "Zip",
            Self::Image => "Image",
        }
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PackageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Zip" => Ok(Self::Zip),
            "Image" => Ok(Self::Image),
            other => Err(format!(
                "Package type must be either 'Zip' or 'Image', got: {other}"
            )),
        }
    }
}

/// Where the function code comes from.
///
/// Exactly one source is populated, consistent with the package kind; the
/// enum makes the mutual exclusion unrepresentable.
#[derive(Debug, Clone)]
pub enum PackageSource {
    /// Archive-based deployment from a local directory of code artifacts.
    Zip {
        /// Directory containing the code artifacts to package.
        code_dir: PathBuf,
        /// Object-storage bucket to stage the archive through, if any.
        bucket: Option<String>,
        /// Object key within the bucket; auto-generated when absent.
        key: Option<String>,
    },
    /// Container-image deployment.
    Image {
        /// Image reference string.
        image_uri: String,
    },
}

impl PackageSource {
    /// The package kind of this source.
    #[must_use]
    pub const fn kind(&self) -> PackageKind {
        match self {
            Self::Zip { .. } => PackageKind::Zip,
            Self::Image { .. } => PackageKind::Image,
        }
    }
}

/// The validated, immutable input to one deployment run.
#[derive(Debug, Clone)]
pub struct DeploymentRequest {
    /// Function name, unique on the control plane.
    pub function_name: String,
    /// Code source for this deployment.
    pub package: PackageSource,
    /// Execution role reference; required when creating a new function.
    pub role: Option<String>,
    /// Runtime identifier (archive-based only).
    pub runtime: Option<String>,
    /// Handler entry point (archive-based only).
    pub handler: Option<String>,
    /// Function description.
    pub description: Option<String>,
    /// Memory limit in MB.
    pub memory_size: Option<u32>,
    /// Execution timeout in seconds.
    pub timeout: Option<u32>,
    /// Ephemeral storage size in MB.
    pub ephemeral_storage: Option<u32>,
    /// Environment variables; always applied, possibly empty.
    pub environment: BTreeMap<String, String>,
    /// Network configuration block.
    pub vpc_config: Option<Value>,
    /// Dead-letter target block.
    pub dead_letter_config: Option<Value>,
    /// Tracing mode block.
    pub tracing_config: Option<Value>,
    /// Layer references (archive-based only).
    pub layers: Option<Vec<String>>,
    /// Filesystem mount blocks.
    pub file_system_configs: Option<Value>,
    /// Image entrypoint override block (image-based only).
    pub image_config: Option<Value>,
    /// Snapshot-start policy block.
    pub snap_start: Option<Value>,
    /// Log format policy block.
    pub logging_config: Option<Value>,
    /// Tag map applied at creation time.
    pub tags: Option<BTreeMap<String, String>>,
    /// Key-management reference for configuration at rest.
    pub kms_key_arn: Option<String>,
    /// Key-management reference for uploaded code at rest.
    pub source_kms_key_arn: Option<String>,
    /// Code-signing configuration reference.
    pub code_signing_config_arn: Option<String>,
    /// Instruction set architectures.
    pub architectures: Option<Vec<String>>,
    /// Publish a new version on deploy.
    pub publish: bool,
    /// Target concurrency-revision marker for optimistic locking.
    pub revision_id: Option<String>,
    /// Validate without committing; only meaningful for existing functions.
    pub dry_run: bool,
}

impl DeploymentRequest {
    /// Create a minimal request with everything optional left unset.
    #[must_use]
    pub fn new(function_name: impl Into<String>, package: PackageSource) -> Self {
        Self {
            function_name: function_name.into(),
            package,
            role: None,
            runtime: None,
            handler: None,
            description: None,
            memory_size: None,
            timeout: None,
            ephemeral_storage: None,
            environment: BTreeMap::new(),
            vpc_config: None,
            dead_letter_config: None,
            tracing_config: None,
            layers: None,
            file_system_configs: None,
            image_config: None,
            snap_start: None,
            logging_config: None,
            tags: None,
            kms_key_arn: None,
            source_kms_key_arn: None,
            code_signing_config_arn: None,
            architectures: None,
            publish: false,
            revision_id: None,
            dry_run: false,
        }
    }

    /// The package kind of this request.
    #[must_use]
    pub const fn kind(&self) -> PackageKind {
        self.package.kind()
    }

    /// Check fatal preconditions that need no remote call.
    pub fn validate(&self) -> DeployResult<()> {
        if self.function_name.is_empty() {
            return Err(DeployError::user_input("Function name must be provided"));
        }

        for (label, value) in [
            ("Memory size", self.memory_size),
            ("Timeout", self.timeout),
            ("Ephemeral storage", self.ephemeral_storage),
        ] {
            if value == Some(0) {
                return Err(DeployError::user_input(format!(
                    "{label} must be a positive number"
                )));
            }
        }

        Ok(())
    }
}

/// Successful run outputs.
///
/// A dry run that halts at the configuration-diff gate produces neither
/// output, hence both fields are optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeployOutcome {
    /// Deployed function ARN.
    pub function_arn: Option<String>,
    /// Deployed version identifier.
    pub version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zip_request() -> DeploymentRequest {
        DeploymentRequest::new(
            "my-function",
            PackageSource::Zip {
                code_dir: PathBuf::from("dist"),
                bucket: None,
                key: None,
            },
        )
    }

    #[test]
    fn package_kind_parsing() {
        assert_eq!("Zip".parse::<PackageKind>().unwrap(), PackageKind::Zip);
        assert_eq!("Image".parse::<PackageKind>().unwrap(), PackageKind::Image);
        assert!("zip".parse::<PackageKind>().is_err());
    }

    #[test]
    fn source_kind_matches_variant() {
        assert_eq!(zip_request().kind(), PackageKind::Zip);

        let image = DeploymentRequest::new(
            "my-function",
            PackageSource::Image {
                image_uri: "registry.example/app:1".to_owned(),
            },
        );
        assert_eq!(image.kind(), PackageKind::Image);
    }

    #[test]
    fn validate_rejects_zero_tunables() {
        let mut request = zip_request();
        request.memory_size = Some(0);
        assert!(request.validate().is_err());

        request.memory_size = Some(128);
        assert!(request.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_name() {
        let mut request = zip_request();
        request.function_name = String::new();
        assert!(request.validate().is_err());
    }
}
