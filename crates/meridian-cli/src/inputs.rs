//! Flag validation and request construction.
//!
//! Everything here runs before any remote call, so failures are cheap and
//! carry messages naming the offending flag.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use anyhow::{anyhow, bail, Result};
use regex::Regex;
use serde_json::Value;
use tracing::warn;

use meridian_deploy::{DeploymentRequest, PackageKind, PackageSource};

use crate::Cli;

const ROLE_ARN_PATTERN: &str =
    r"^arn:aws(-[a-z0-9-]+)?:iam::[0-9]{12}:role/[a-zA-Z0-9+=,.@_/-]+$";
const CODE_SIGNING_ARN_PATTERN: &str =
    r"^arn:aws(-[a-z0-9-]+)?:lambda:[a-z0-9-]+:[0-9]{12}:code-signing-config:[a-zA-Z0-9-]+$";
const KMS_KEY_ARN_PATTERN: &str =
    r"^arn:aws(-[a-z0-9-]+)?:kms:[a-z0-9-]+:[0-9]{12}:key/[a-zA-Z0-9-]+$";

/// Build a validated deployment request from command-line flags.
pub fn build_request(cli: &Cli) -> Result<DeploymentRequest> {
    let kind: PackageKind = cli.package_type.parse().map_err(|e: String| anyhow!(e))?;

    let package = resolve_package(cli, kind)?;
    validate_arns(cli)?;

    let mut request = DeploymentRequest::new(cli.function_name.clone(), package);

    request.role = cli.role.clone();
    request.description = cli.function_description.clone();
    request.memory_size = cli.memory_size;
    request.timeout = cli.timeout;
    request.ephemeral_storage = cli.ephemeral_storage;
    request.kms_key_arn = cli.kms_key_arn.clone();
    request.code_signing_config_arn = cli.code_signing_config_arn.clone();
    request.publish = cli.publish;
    request.revision_id = cli.revision_id.clone();
    request.dry_run = cli.dry_run;

    match kind {
        PackageKind::Zip => {
            request.handler = Some(
                cli.handler
                    .clone()
                    .unwrap_or_else(|| "index.handler".to_owned()),
            );
            request.runtime = Some(
                cli.runtime
                    .clone()
                    .unwrap_or_else(|| "nodejs20.x".to_owned()),
            );
            request.source_kms_key_arn = cli.source_kms_key_arn.clone();
        }
        PackageKind::Image => {
            request.handler = cli.handler.clone();
            request.runtime = cli.runtime.clone();
        }
    }

    if let Some(environment) = &cli.environment {
        request.environment = parse_string_map(environment, "environment")?;
    }
    if let Some(tags) = &cli.tags {
        request.tags = Some(parse_string_map(tags, "tags")?);
    }

    request.vpc_config = cli
        .vpc_config
        .as_deref()
        .map(parse_vpc_config)
        .transpose()?;
    request.dead_letter_config = cli
        .dead_letter_config
        .as_deref()
        .map(parse_dead_letter_config)
        .transpose()?;
    request.tracing_config = cli
        .tracing_config
        .as_deref()
        .map(parse_tracing_config)
        .transpose()?;
    request.layers = cli.layers.as_deref().map(parse_layers).transpose()?;
    request.file_system_configs = cli
        .file_system_configs
        .as_deref()
        .map(parse_file_system_configs)
        .transpose()?;
    request.snap_start = cli.snap_start.as_deref().map(parse_snap_start).transpose()?;
    request.image_config = cli
        .image_config
        .as_deref()
        .map(|raw| parse_json(raw, "image-config"))
        .transpose()?;
    request.logging_config = cli
        .logging_config
        .as_deref()
        .map(|raw| parse_json(raw, "logging-config"))
        .transpose()?;

    if let Some(architectures) = &cli.architectures {
        for arch in architectures {
            if arch != "x86_64" && arch != "arm64" {
                bail!("architectures must be 'x86_64' or 'arm64', got: {arch}");
            }
        }
        request.architectures = Some(architectures.clone());
    }

    Ok(request)
}

/// Resolve the code source for the declared package type, warning about
/// flags the other type owns.
fn resolve_package(cli: &Cli, kind: PackageKind) -> Result<PackageSource> {
    match kind {
        PackageKind::Zip => {
            let code_dir = cli.code_artifacts_dir.clone().ok_or_else(|| {
                anyhow!("code-artifacts-dir must be provided when package-type is \"Zip\"")
            })?;
            check_path_traversal(&code_dir)?;

            if cli.image_uri.is_some() {
                warn!("image-uri parameter is ignored when package-type is \"Zip\"");
            }
            if cli.image_config.is_some() {
                warn!("image-config parameter is ignored when package-type is \"Zip\"");
            }

            Ok(PackageSource::Zip {
                code_dir,
                bucket: cli.s3_bucket.clone(),
                key: cli.s3_key.clone(),
            })
        }
        PackageKind::Image => {
            let image_uri = cli.image_uri.clone().ok_or_else(|| {
                anyhow!("image-uri must be provided when package-type is \"Image\"")
            })?;

            if cli.code_artifacts_dir.is_some() {
                warn!("code-artifacts-dir parameter is ignored when package-type is \"Image\"");
            }
            if cli.s3_bucket.is_some() {
                warn!("s3-bucket parameter is ignored when package-type is \"Image\"");
            }
            if cli.s3_key.is_some() {
                warn!("s3-key parameter is ignored when package-type is \"Image\"");
            }
            if cli.source_kms_key_arn.is_some() {
                warn!("source-kms-key-arn parameter is ignored when package-type is \"Image\"");
            }

            Ok(PackageSource::Image { image_uri })
        }
    }
}

/// Reject artifact paths that climb out of the working directory.
fn check_path_traversal(path: &Path) -> Result<()> {
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        bail!(
            "Security error: Path traversal attempt detected. The path '{}' points outside \
             the allowed directory.",
            path.display()
        );
    }
    Ok(())
}

fn validate_arns(cli: &Cli) -> Result<()> {
    if let Some(role) = &cli.role {
        validate_pattern(role, ROLE_ARN_PATTERN, "Invalid IAM role ARN format")?;
    }
    if let Some(arn) = &cli.code_signing_config_arn {
        validate_pattern(
            arn,
            CODE_SIGNING_ARN_PATTERN,
            "Invalid code signing config ARN format",
        )?;
    }
    if let Some(arn) = &cli.kms_key_arn {
        validate_pattern(arn, KMS_KEY_ARN_PATTERN, "Invalid KMS key ARN format")?;
    }
    if let Some(arn) = &cli.source_kms_key_arn {
        validate_pattern(arn, KMS_KEY_ARN_PATTERN, "Invalid KMS key ARN format")?;
    }
    Ok(())
}

fn validate_pattern(value: &str, pattern: &str, label: &str) -> Result<()> {
    let regex = Regex::new(pattern)?;
    if regex.is_match(value) {
        Ok(())
    } else {
        bail!("{label}: {value}")
    }
}

fn parse_json(raw: &str, input_name: &str) -> Result<Value> {
    serde_json::from_str(raw)
        .map_err(|e| anyhow!("Invalid JSON in {input_name} input: {e}"))
}

fn parse_string_map(raw: &str, input_name: &str) -> Result<BTreeMap<String, String>> {
    let value = parse_json(raw, input_name)?;
    let Value::Object(map) = value else {
        bail!("{input_name} must be an object of key-value pairs");
    };

    let mut result = BTreeMap::new();
    for (key, entry) in map {
        match entry {
            Value::String(s) => {
                result.insert(key, s);
            }
            other => {
                result.insert(key, other.to_string());
            }
        }
    }
    Ok(result)
}

fn parse_vpc_config(raw: &str) -> Result<Value> {
    let value = parse_json(raw, "vpc-config")?;
    if !matches!(value.get("SubnetIds"), Some(Value::Array(_))) {
        bail!("vpc-config must include 'SubnetIds' as an array");
    }
    if !matches!(value.get("SecurityGroupIds"), Some(Value::Array(_))) {
        bail!("vpc-config must include 'SecurityGroupIds' as an array");
    }
    Ok(value)
}

fn parse_dead_letter_config(raw: &str) -> Result<Value> {
    let value = parse_json(raw, "dead-letter-config")?;
    if value.get("TargetArn").and_then(Value::as_str).is_none() {
        bail!("dead-letter-config must include 'TargetArn'");
    }
    Ok(value)
}

fn parse_tracing_config(raw: &str) -> Result<Value> {
    let value = parse_json(raw, "tracing-config")?;
    match value.get("Mode").and_then(Value::as_str) {
        Some("Active" | "PassThrough") => Ok(value),
        _ => bail!("tracing-config Mode must be 'Active' or 'PassThrough'"),
    }
}

fn parse_layers(raw: &str) -> Result<Vec<String>> {
    let value = parse_json(raw, "layers")?;
    let Value::Array(items) = value else {
        bail!("layers must be an array of layer ARNs");
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::String(s) => Ok(s),
            _ => bail!("layers must be an array of layer ARNs"),
        })
        .collect()
}

fn parse_file_system_configs(raw: &str) -> Result<Value> {
    let value = parse_json(raw, "file-system-configs")?;
    let Some(items) = value.as_array() else {
        bail!("file-system-configs must be an array");
    };
    for config in items {
        let has_arn = config.get("Arn").and_then(Value::as_str).is_some();
        let has_mount = config.get("LocalMountPath").and_then(Value::as_str).is_some();
        if !has_arn || !has_mount {
            bail!("Each file-system-config must include 'Arn' and 'LocalMountPath'");
        }
    }
    Ok(value)
}

fn parse_snap_start(raw: &str) -> Result<Value> {
    let value = parse_json(raw, "snap-start")?;
    match value.get("ApplyOn").and_then(Value::as_str) {
        Some("PublishedVersions" | "None") => Ok(value),
        _ => bail!("snap-start ApplyOn must be 'PublishedVersions' or 'None'"),
    }
}
