//! Function control-plane client.
//!
//! The [`FunctionClient`] trait is the seam between the deployment flow and
//! the control plane. The production implementation talks HTTP; the mock
//! records calls and replays scripted responses for tests.

mod http;
mod mock;

pub use http::HttpFunctionClient;
pub use mock::MockFunctionClient;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::RemoteError;
use crate::types::PackageKind;

/// A function's remote configuration snapshot.
///
/// The control plane returns an open-ended document; keeping it as a JSON
/// map lets the diff engine compare fields the typed layer does not model.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct FunctionConfig(Map<String, Value>);

impl FunctionConfig {
    /// Wrap a JSON value; non-object values yield an empty snapshot.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            _ => Self(Map::new()),
        }
    }

    /// Whether the snapshot holds no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Look up a raw field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// The underlying map, for field-by-field comparison.
    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Lifecycle state, e.g. `Pending`, `Active`, `Failed`.
    #[must_use]
    pub fn state(&self) -> Option<&str> {
        self.str_field("State")
    }

    /// Explanation attached to a failed state, if any.
    #[must_use]
    pub fn state_reason(&self) -> Option<&str> {
        self.str_field("StateReason")
    }

    /// Status of the most recent update, e.g. `InProgress`, `Successful`.
    #[must_use]
    pub fn last_update_status(&self) -> Option<&str> {
        self.str_field("LastUpdateStatus")
    }

    /// Explanation attached to a failed update, if any.
    #[must_use]
    pub fn last_update_status_reason(&self) -> Option<&str> {
        self.str_field("LastUpdateStatusReason")
    }

    /// Declared package type of the function.
    #[must_use]
    pub fn package_type(&self) -> Option<&str> {
        self.str_field("PackageType")
    }

    /// Function ARN.
    #[must_use]
    pub fn function_arn(&self) -> Option<&str> {
        self.str_field("FunctionArn")
    }

    /// Version identifier.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        self.str_field("Version")
    }
}

/// Outputs returned by create and code-update calls.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FunctionOutputs {
    /// Function ARN.
    pub function_arn: Option<String>,
    /// Version identifier.
    pub version: Option<String>,
}

/// Environment variable block.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvironmentSpec {
    /// Variable map; always sent, possibly empty, so stale remote variables
    /// get cleared.
    #[serde(rename = "Variables")]
    pub variables: BTreeMap<String, String>,
}

/// Ephemeral storage block.
#[derive(Debug, Clone, Serialize)]
pub struct EphemeralStorageSpec {
    /// Size in MB.
    #[serde(rename = "Size")]
    pub size: u32,
}

/// The desired configuration sent on create and configuration update.
///
/// Optional fields are omitted from the wire payload entirely so that an
/// unset input never clobbers a remote value.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigSpec {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ephemeral_storage: Option<EphemeralStorageSpec>,

    pub environment: EnvironmentSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vpc_config: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dead_letter_config: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracing_config: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub layers: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_system_configs: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_config: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub snap_start: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging_config: Option<Value>,

    #[serde(rename = "KMSKeyArn", skip_serializing_if = "Option::is_none")]
    pub kms_key_arn: Option<String>,
}

impl ConfigSpec {
    /// Render the desired configuration as a JSON document for diffing
    /// against a snapshot.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn serialize_base64<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
}

/// Where the uploaded code lives, as sent on the wire.
#[derive(Clone, Serialize)]
#[serde(untagged)]
pub enum CodeSource {
    /// Container image reference.
    Image {
        #[serde(rename = "ImageUri")]
        image_uri: String,
    },
    /// Archive staged in object storage.
    S3 {
        #[serde(rename = "S3Bucket")]
        bucket: String,
        #[serde(rename = "S3Key")]
        key: String,
        #[serde(rename = "SourceKMSKeyArn", skip_serializing_if = "Option::is_none")]
        source_kms_key_arn: Option<String>,
    },
    /// Archive bytes sent inline, base64-encoded.
    Inline {
        #[serde(rename = "ZipFile", serialize_with = "serialize_base64")]
        zip_file: Bytes,
        #[serde(rename = "SourceKMSKeyArn", skip_serializing_if = "Option::is_none")]
        source_kms_key_arn: Option<String>,
    },
}

impl CodeSource {
    /// Render as JSON with inline archive bytes replaced by a placeholder.
    #[must_use]
    pub fn redacted_value(&self) -> Value {
        match self {
            Self::Inline { zip_file, .. } => {
                let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
                if let Some(map) = value.as_object_mut() {
                    map.insert(
                        "ZipFile".to_owned(),
                        Value::String(format!(
                            "<binary data of length {} bytes>",
                            zip_file.len()
                        )),
                    );
                }
                value
            }
            _ => serde_json::to_value(self).unwrap_or(Value::Null),
        }
    }
}

impl fmt::Debug for CodeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image { image_uri } => f
                .debug_struct("Image")
                .field("image_uri", image_uri)
                .finish(),
            Self::S3 {
                bucket,
                key,
                source_kms_key_arn,
            } => f
                .debug_struct("S3")
                .field("bucket", bucket)
                .field("key", key)
                .field("source_kms_key_arn", source_kms_key_arn)
                .finish(),
            Self::Inline {
                zip_file,
                source_kms_key_arn,
            } => f
                .debug_struct("Inline")
                .field("zip_file", &format!("<{} bytes>", zip_file.len()))
                .field("source_kms_key_arn", source_kms_key_arn)
                .finish(),
        }
    }
}

/// Payload for creating a function.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateFunctionInput {
    pub function_name: String,

    pub package_type: PackageKind,

    pub code: CodeSource,

    #[serde(flatten)]
    pub config: ConfigSpec,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub architectures: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<BTreeMap<String, String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_signing_config_arn: Option<String>,
}

/// Payload for updating a function's configuration.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateConfigInput {
    pub function_name: String,

    #[serde(flatten)]
    pub config: ConfigSpec,
}

/// Payload for updating a function's code.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateCodeInput {
    pub function_name: String,

    #[serde(flatten)]
    pub code: CodeSource,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub architectures: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,
}

impl UpdateCodeInput {
    /// Render as JSON with inline archive bytes replaced by a placeholder.
    #[must_use]
    pub fn redacted_value(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or(Value::Null);
        if let (Some(map), CodeSource::Inline { zip_file, .. }) =
            (value.as_object_mut(), &self.code)
        {
            map.insert(
                "ZipFile".to_owned(),
                Value::String(format!("<binary data of length {} bytes>", zip_file.len())),
            );
        }
        value
    }
}

/// Operations the deployment flow needs from the control plane.
#[async_trait]
pub trait FunctionClient: Send + Sync {
    /// Fetch the configuration snapshot of a function.
    async fn get_function_configuration(&self, name: &str)
        -> Result<FunctionConfig, RemoteError>;

    /// Create a function.
    async fn create_function(
        &self,
        input: &CreateFunctionInput,
    ) -> Result<FunctionOutputs, RemoteError>;

    /// Update a function's configuration.
    async fn update_function_configuration(
        &self,
        input: &UpdateConfigInput,
    ) -> Result<(), RemoteError>;

    /// Update a function's code.
    async fn update_function_code(
        &self,
        input: &UpdateCodeInput,
    ) -> Result<FunctionOutputs, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn config_spec_omits_unset_fields() {
        let spec = ConfigSpec {
            memory_size: Some(256),
            ..ConfigSpec::default()
        };
        let value = spec.to_value();
        assert_eq!(
            value,
            json!({"MemorySize": 256, "Environment": {"Variables": {}}})
        );
    }

    #[test]
    fn config_spec_renames_kms_key() {
        let spec = ConfigSpec {
            kms_key_arn: Some("arn:aws:kms:us-east-1:123:key/abc".to_owned()),
            ..ConfigSpec::default()
        };
        let value = spec.to_value();
        assert!(value.get("KMSKeyArn").is_some());
        assert!(value.get("KmsKeyArn").is_none());
    }

    #[test]
    fn inline_code_serializes_base64() {
        let code = CodeSource::Inline {
            zip_file: Bytes::from_static(b"hello"),
            source_kms_key_arn: None,
        };
        let value = serde_json::to_value(&code).unwrap();
        assert_eq!(value, json!({"ZipFile": "aGVsbG8="}));
    }

    #[test]
    fn inline_code_debug_is_redacted() {
        let code = CodeSource::Inline {
            zip_file: Bytes::from_static(b"hello"),
            source_kms_key_arn: None,
        };
        let rendered = format!("{code:?}");
        assert!(rendered.contains("<5 bytes>"));
        assert!(!rendered.contains("hello"));
    }

    #[test]
    fn update_code_input_redaction() {
        let input = UpdateCodeInput {
            function_name: "fn".to_owned(),
            code: CodeSource::Inline {
                zip_file: Bytes::from_static(&[0u8; 16]),
                source_kms_key_arn: None,
            },
            architectures: None,
            publish: Some(true),
            revision_id: None,
            dry_run: Some(true),
        };
        let value = input.redacted_value();
        assert_eq!(
            value.get("ZipFile").and_then(Value::as_str),
            Some("<binary data of length 16 bytes>")
        );
        assert_eq!(value.get("DryRun"), Some(&json!(true)));
    }

    #[test]
    fn snapshot_accessors() {
        let config = FunctionConfig::from_value(json!({
            "State": "Pending",
            "StateReason": "Creating",
            "PackageType": "Zip",
            "FunctionArn": "arn:aws:lambda:us-east-1:123:function:fn",
            "Version": "3"
        }));
        assert_eq!(config.state(), Some("Pending"));
        assert_eq!(config.state_reason(), Some("Creating"));
        assert_eq!(config.package_type(), Some("Zip"));
        assert_eq!(config.version(), Some("3"));
        assert!(config.last_update_status().is_none());
    }

    #[test]
    fn snapshot_from_non_object_is_empty() {
        assert!(FunctionConfig::from_value(json!("nope")).is_empty());
    }
}
