//! The deployment flow.
//!
//! One [`Deployer::run`] call takes a function from source artifacts to a
//! deployed, ready function: package, stage, create or reconcile
//! configuration, push code, and wait for the control plane to settle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, info};

use crate::artifact::package_artifacts;
use crate::client::{
    CodeSource, ConfigSpec, CreateFunctionInput, EnvironmentSpec, EphemeralStorageSpec,
    FunctionClient, FunctionConfig, UpdateCodeInput, UpdateConfigInput,
};
use crate::config::{DeployConfig, WaitConfig};
use crate::diff::has_configuration_changed;
use crate::error::{classify_remote, DeployError, DeployResult, RemoteError};
use crate::storage::{generate_artifact_key, ArtifactUploader};
use crate::types::{DeployOutcome, DeploymentRequest, PackageKind, PackageSource};
use crate::wait::{wait_until_active, wait_until_update_settled};

/// Orchestrates a single function deployment.
pub struct Deployer {
    client: Arc<dyn FunctionClient>,
    uploader: Arc<dyn ArtifactUploader>,
    region: String,
    wait: WaitConfig,
    commit_sha: Option<String>,
}

/// Resolved staging plan for archive-based deployments.
struct Staging {
    archive_path: PathBuf,
    bucket: Option<String>,
    key: Option<String>,
}

impl Deployer {
    /// Create a deployer from its collaborators and configuration.
    #[must_use]
    pub fn new(
        client: Arc<dyn FunctionClient>,
        uploader: Arc<dyn ArtifactUploader>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            client,
            uploader,
            region: config.region.clone(),
            wait: config.wait.clone(),
            commit_sha: None,
        }
    }

    /// Attach a commit hash for artifact key generation.
    #[must_use]
    pub fn with_commit_sha(mut self, sha: impl Into<String>) -> Self {
        self.commit_sha = Some(sha.into());
        self
    }

    /// Run the deployment.
    pub async fn run(&self, request: &DeploymentRequest) -> DeployResult<DeployOutcome> {
        request.validate()?;

        let name = request.function_name.as_str();
        info!(
            function = %name,
            package_type = %request.kind(),
            dry_run = request.dry_run,
            "starting deployment"
        );

        let exists = self.function_exists(name).await?;

        if request.dry_run {
            info!("dry run mode enabled, no changes will be applied");
            if !exists {
                return Err(DeployError::user_input(
                    "DRY RUN MODE can only be used for updating function code of existing functions",
                ));
            }
        }

        let staging = self.stage_archive(request).await?;

        let mut outcome = DeployOutcome::default();

        if !exists {
            outcome = self.create(request, staging.as_ref()).await?;
            wait_until_active(self.client.as_ref(), name, self.wait.active_minutes).await?;
        }

        let current = match self.client.get_function_configuration(name).await {
            Ok(config) => config,
            Err(e) => return Err(self.classify_and_log(&e, "Action failed with error")),
        };

        check_package_kind(&current, request.kind())?;

        let desired = self.build_config_spec(request).to_value();
        if has_configuration_changed(&current, &desired) {
            if request.dry_run {
                // Configuration drift cannot be validated remotely, so a dry
                // run stops here rather than pretend the diff was applied.
                info!("[dry run] configuration updates are not simulated in dry run mode");
                return Ok(outcome);
            }

            info!(function = %name, "updating function configuration");
            let input = UpdateConfigInput {
                function_name: name.to_owned(),
                config: self.build_config_spec(request),
            };
            if let Err(e) = self.client.update_function_configuration(&input).await {
                return Err(self.classify_and_log(&e, "Failed to update function configuration"));
            }
            wait_until_update_settled(self.client.as_ref(), name, self.wait.update_minutes)
                .await?;
        } else {
            info!(function = %name, "no configuration changes detected");
        }

        let code = self.resolve_code_source(request, staging.as_ref()).await?;
        let input = UpdateCodeInput {
            function_name: name.to_owned(),
            code,
            architectures: request.architectures.clone(),
            publish: request.publish.then_some(true),
            revision_id: request.revision_id.clone(),
            dry_run: request.dry_run.then_some(true),
        };

        if request.dry_run {
            let payload = serde_json::to_string_pretty(&input.redacted_value())
                .unwrap_or_else(|_| "<unserialisable payload>".to_owned());
            info!("[dry run] code update payload:\n{payload}");
        }

        info!(function = %name, "updating function code");
        match self.client.update_function_code(&input).await {
            Ok(outputs) => {
                if request.dry_run {
                    info!("[dry run] function code validation passed");
                    outcome.function_arn = outputs.function_arn.or_else(|| {
                        Some(format!(
                            "arn:aws:lambda:{}:000000000000:function:{name}",
                            self.region
                        ))
                    });
                    outcome.version = outputs.version.or_else(|| Some("$LATEST".to_owned()));
                    info!("[dry run] function code update simulation completed");
                    return Ok(outcome);
                }

                if outputs.function_arn.is_some() {
                    outcome.function_arn = outputs.function_arn;
                }
                if outputs.version.is_some() {
                    outcome.version = outputs.version;
                }
            }
            Err(e) => return Err(self.classify_and_log(&e, "Failed to update function code")),
        }

        info!(function = %name, "function deployment completed successfully");
        Ok(outcome)
    }

    /// Whether the function already exists on the control plane.
    async fn function_exists(&self, name: &str) -> DeployResult<bool> {
        match self.client.get_function_configuration(name).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(self.classify_and_log(&e, "Action failed with error")),
        }
    }

    /// Package archive-based code and settle the staging bucket and key.
    async fn stage_archive(&self, request: &DeploymentRequest) -> DeployResult<Option<Staging>> {
        let PackageSource::Zip {
            code_dir,
            bucket,
            key,
        } = &request.package
        else {
            return Ok(None);
        };

        let archive_path = package_artifacts(code_dir).await?;

        let key = match (bucket, key) {
            (Some(_), Some(key)) => Some(key.clone()),
            (Some(_), None) => {
                let generated =
                    generate_artifact_key(&request.function_name, self.commit_sha.as_deref());
                info!(key = %generated, "generated S3 key for code archive");
                Some(generated)
            }
            (None, _) => None,
        };

        Ok(Some(Staging {
            archive_path,
            bucket: bucket.clone(),
            key,
        }))
    }

    /// Create the function and report its initial outputs.
    async fn create(
        &self,
        request: &DeploymentRequest,
        staging: Option<&Staging>,
    ) -> DeployResult<DeployOutcome> {
        let name = request.function_name.as_str();

        if request.role.is_none() {
            return Err(DeployError::user_input(
                "Role ARN must be provided when creating a new function",
            ));
        }

        info!(function = %name, "function does not exist, creating it");

        let input = CreateFunctionInput {
            function_name: name.to_owned(),
            package_type: request.kind(),
            code: self.resolve_code_source(request, staging).await?,
            config: self.build_config_spec(request),
            publish: request.publish.then_some(true),
            architectures: request.architectures.clone(),
            tags: request.tags.clone(),
            code_signing_config_arn: request.code_signing_config_arn.clone(),
        };

        match self.client.create_function(&input).await {
            Ok(outputs) => Ok(DeployOutcome {
                function_arn: outputs.function_arn,
                version: outputs.version,
            }),
            Err(e) => Err(self.classify_and_log(&e, "Failed to create function")),
        }
    }

    /// Resolve where the code update payload points.
    ///
    /// Bucket-staged archives are uploaded here, once per call site, so a
    /// create followed by the unconditional code update stages two objects
    /// under the same key.
    async fn resolve_code_source(
        &self,
        request: &DeploymentRequest,
        staging: Option<&Staging>,
    ) -> DeployResult<CodeSource> {
        match &request.package {
            PackageSource::Image { image_uri } => Ok(CodeSource::Image {
                image_uri: image_uri.clone(),
            }),
            PackageSource::Zip { .. } => {
                let staging = staging.ok_or_else(|| {
                    DeployError::Package("archive was not staged before use".to_owned())
                })?;

                match (&staging.bucket, &staging.key) {
                    (Some(bucket), Some(key)) => {
                        let artifact = self
                            .uploader
                            .upload(&staging.archive_path, bucket, key)
                            .await?;
                        Ok(CodeSource::S3 {
                            bucket: artifact.bucket,
                            key: artifact.key,
                            source_kms_key_arn: request.source_kms_key_arn.clone(),
                        })
                    }
                    _ => {
                        let bytes = read_package(&staging.archive_path).await?;
                        Ok(CodeSource::Inline {
                            zip_file: bytes,
                            source_kms_key_arn: request.source_kms_key_arn.clone(),
                        })
                    }
                }
            }
        }
    }

    /// Build the desired configuration, excluding fields that do not apply
    /// to the request's package kind.
    fn build_config_spec(&self, request: &DeploymentRequest) -> ConfigSpec {
        let archive_based = request.kind() == PackageKind::Zip;

        ConfigSpec {
            role: request.role.clone(),
            runtime: archive_based.then(|| request.runtime.clone()).flatten(),
            handler: archive_based.then(|| request.handler.clone()).flatten(),
            description: request.description.clone(),
            memory_size: request.memory_size,
            timeout: request.timeout,
            ephemeral_storage: request
                .ephemeral_storage
                .map(|size| EphemeralStorageSpec { size }),
            environment: EnvironmentSpec {
                variables: request.environment.clone(),
            },
            vpc_config: request.vpc_config.clone(),
            dead_letter_config: request.dead_letter_config.clone(),
            tracing_config: request.tracing_config.clone(),
            layers: archive_based.then(|| request.layers.clone()).flatten(),
            file_system_configs: request.file_system_configs.clone(),
            image_config: (!archive_based)
                .then(|| request.image_config.clone())
                .flatten(),
            snap_start: request.snap_start.clone(),
            logging_config: request.logging_config.clone(),
            kms_key_arn: request.kms_key_arn.clone(),
        }
    }

    /// Classify a remote failure and log it at the step where it happened.
    fn classify_and_log(&self, error: &RemoteError, context: &str) -> DeployError {
        let classified = classify_remote(error, context);
        error!("{classified}");
        debug!(name = ?error.name, status = ?error.status, "remote error detail");
        classified
    }
}

/// Reject changing an existing function's package kind.
fn check_package_kind(current: &FunctionConfig, requested: PackageKind) -> DeployResult<()> {
    match current.package_type() {
        Some(existing) if existing != requested.as_str() => Err(DeployError::user_input(format!(
            "Cannot change package type of existing function from {existing} to {requested}"
        ))),
        _ => Ok(()),
    }
}

/// Read the packaged archive into memory for inline delivery.
async fn read_package(path: &Path) -> DeployResult<Bytes> {
    match tokio::fs::read(path).await {
        Ok(data) => Ok(Bytes::from(data)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DeployError::NotFound(format!(
            "Could not find packaged code at {}. The archive may have been removed before upload.",
            path.display()
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            Err(DeployError::PermissionDenied(format!(
                "Permission denied reading packaged code at {}",
                path.display()
            )))
        }
        Err(e) => Err(DeployError::generic(
            "Failed to read packaged code",
            e.to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockFunctionClient;
    use crate::error::ErrorClass;
    use crate::storage::MockUploader;
    use serde_json::json;
    use std::fs;

    fn active_config() -> FunctionConfig {
        FunctionConfig::from_value(json!({
            "State": "Active",
            "PackageType": "Zip",
            "MemorySize": 128,
            "Role": "arn:aws:iam::123456789012:role/deploy",
            "LastUpdateStatus": "Successful",
            "Environment": {"Variables": {}},
            "FunctionArn": "arn:aws:lambda:us-east-1:123456789012:function:fn",
            "Version": "1"
        }))
    }

    fn code_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.js"), b"exports.handler = 1;").unwrap();
        dir
    }

    fn deployer(client: Arc<MockFunctionClient>, uploader: Arc<MockUploader>) -> Deployer {
        Deployer::new(client, uploader, &DeployConfig::default())
    }

    fn zip_request(dir: &tempfile::TempDir) -> DeploymentRequest {
        DeploymentRequest::new(
            "fn",
            PackageSource::Zip {
                code_dir: dir.path().to_owned(),
                bucket: None,
                key: None,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn creates_absent_function_with_inline_code() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::absent());
        // Existence check answers not-found, everything after sees the
        // created function.
        client.push_get(Err(
            RemoteError::named("ResourceNotFoundException", "missing").with_status(404)
        ));
        client.set_default_get(Ok(active_config()));

        let uploader = Arc::new(MockUploader::default());
        let deployer = deployer(Arc::clone(&client), Arc::clone(&uploader));

        let mut request = zip_request(&dir);
        request.role = Some("arn:aws:iam::123456789012:role/deploy".to_owned());
        request.memory_size = Some(128);

        let outcome = deployer.run(&request).await.unwrap();

        let created = client.created();
        assert_eq!(created.len(), 1);
        assert!(matches!(created[0].code, CodeSource::Inline { .. }));
        assert_eq!(client.code_updates().len(), 1);
        assert!(uploader.uploads().is_empty());
        assert!(outcome.function_arn.is_some());
    }

    #[tokio::test]
    async fn create_without_role_fails() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::absent());
        let deployer = deployer(Arc::clone(&client), Arc::new(MockUploader::default()));

        let err = deployer.run(&zip_request(&dir)).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::UserInput);
        assert!(err.to_string().contains("Role ARN must be provided"));
        assert!(client.created().is_empty());
    }

    #[tokio::test]
    async fn existing_function_without_drift_only_updates_code() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        let uploader = Arc::new(MockUploader::default());
        let deployer = deployer(Arc::clone(&client), Arc::clone(&uploader));

        let mut request = zip_request(&dir);
        request.package = PackageSource::Zip {
            code_dir: dir.path().to_owned(),
            bucket: Some("deploy-bucket".to_owned()),
            key: Some("code.zip".to_owned()),
        };
        request.memory_size = Some(128);

        let outcome = deployer.run(&request).await.unwrap();

        assert!(client.created().is_empty());
        assert!(client.config_updates().is_empty());
        assert_eq!(client.code_updates().len(), 1);
        assert!(matches!(
            client.code_updates()[0].code,
            CodeSource::S3 { .. }
        ));
        assert_eq!(uploader.uploads().len(), 1);
        assert_eq!(outcome.version.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn configuration_drift_triggers_update_and_wait() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        // The settle wait polls after the configuration update.
        client.set_default_get(Ok(FunctionConfig::from_value(json!({
            "State": "Active",
            "PackageType": "Zip",
            "MemorySize": 128,
            "Environment": {"Variables": {}},
            "LastUpdateStatus": "Successful"
        }))));

        let deployer = deployer(Arc::clone(&client), Arc::new(MockUploader::default()));

        let mut request = zip_request(&dir);
        request.memory_size = Some(512);

        deployer.run(&request).await.unwrap();

        assert_eq!(client.config_updates().len(), 1);
        assert_eq!(client.code_updates().len(), 1);
    }

    #[tokio::test]
    async fn dry_run_on_absent_function_fails() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::absent());
        let deployer = deployer(client, Arc::new(MockUploader::default()));

        let mut request = zip_request(&dir);
        request.dry_run = true;

        let err = deployer.run(&request).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("DRY RUN MODE can only be used for updating function code"));
    }

    #[tokio::test]
    async fn dry_run_halts_at_configuration_drift() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        let deployer = deployer(Arc::clone(&client), Arc::new(MockUploader::default()));

        let mut request = zip_request(&dir);
        request.memory_size = Some(512);
        request.dry_run = true;

        let outcome = deployer.run(&request).await.unwrap();

        assert!(client.config_updates().is_empty());
        assert!(client.code_updates().is_empty());
        assert_eq!(outcome, DeployOutcome::default());
    }

    #[tokio::test]
    async fn dry_run_code_update_synthesises_outputs() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        client.set_code_update_response(Ok(Default::default()));
        let deployer = deployer(Arc::clone(&client), Arc::new(MockUploader::default()));

        let mut request = zip_request(&dir);
        request.memory_size = Some(128);
        request.dry_run = true;

        let outcome = deployer.run(&request).await.unwrap();

        assert_eq!(client.code_updates().len(), 1);
        assert_eq!(client.code_updates()[0].dry_run, Some(true));
        assert_eq!(outcome.version.as_deref(), Some("$LATEST"));
        assert_eq!(
            outcome.function_arn.as_deref(),
            Some("arn:aws:lambda:us-east-1:000000000000:function:fn")
        );
    }

    #[tokio::test]
    async fn package_kind_migration_is_rejected() {
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        let deployer = deployer(Arc::clone(&client), Arc::new(MockUploader::default()));

        let request = DeploymentRequest::new(
            "fn",
            PackageSource::Image {
                image_uri: "registry.example/app:1".to_owned(),
            },
        );

        let err = deployer.run(&request).await.unwrap_err();
        assert!(err
            .to_string()
            .contains("Cannot change package type of existing function from Zip to Image"));
        assert!(client.code_updates().is_empty());
    }

    #[tokio::test]
    async fn remote_failures_are_classified() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        client.set_code_update_response(Err(
            RemoteError::new("boom").with_status(503)
        ));
        let deployer = deployer(client, Arc::new(MockUploader::default()));

        let mut request = zip_request(&dir);
        request.memory_size = Some(128);

        let err = deployer.run(&request).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::ServerFault);
    }

    #[tokio::test]
    async fn upload_failure_aborts_before_code_update() {
        let dir = code_dir();
        let client = Arc::new(MockFunctionClient::with_configuration(active_config()));
        let uploader = Arc::new(MockUploader::failing(DeployError::PermissionDenied(
            "Permissions error: bucket denied. Check IAM roles.".to_owned(),
        )));
        let deployer = deployer(Arc::clone(&client), uploader);

        let mut request = zip_request(&dir);
        request.package = PackageSource::Zip {
            code_dir: dir.path().to_owned(),
            bucket: Some("deploy-bucket".to_owned()),
            key: None,
        };
        request.memory_size = Some(128);

        let err = deployer.run(&request).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::PermissionDenied);
        assert!(client.code_updates().is_empty());
    }
}
