//! Meridian Deployment Orchestration
//!
//! This crate takes a single serverless function from local code artifacts to
//! a deployed, ready function on the Meridian control plane. It packages the
//! code, stages it through object storage when a bucket is configured,
//! creates the function or reconciles its configuration, pushes the code and
//! waits for the control plane to settle.
//!
//! # Flow
//!
//! ```text
//! validate ──▶ package ──▶ exists? ──▶ create ──▶ wait active
//!                              │                      │
//!                              ▼                      ▼
//!                         config diff ──▶ update ──▶ wait settled
//!                              │
//!                              ▼
//!                         code update ──▶ outputs
//! ```
//!
//! The configuration diff only touches fields the caller supplied; remote
//! fields left unmentioned are never clobbered. The code update always runs,
//! so a deployment without configuration drift still refreshes the code.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use meridian_deploy::{
//!     DeployConfig, Deployer, DeploymentRequest, HttpFunctionClient, IdentityClient,
//!     PackageSource, S3Uploader,
//! };
//!
//! let config = DeployConfig::load()?;
//! let client = Arc::new(HttpFunctionClient::new(&config.api)?);
//! let identity = IdentityClient::new(&config.api)?;
//! let uploader = Arc::new(S3Uploader::new(
//!     config.region.clone(),
//!     config.storage.clone(),
//!     identity,
//!     &config.api.user_agent,
//! )?);
//!
//! let request = DeploymentRequest::new(
//!     "greet",
//!     PackageSource::Zip {
//!         code_dir: "dist".into(),
//!         bucket: Some("deploy-artifacts".to_owned()),
//!         key: None,
//!     },
//! );
//!
//! let deployer = Deployer::new(client, uploader, &config);
//! let outcome = deployer.run(&request).await?;
//! ```

#![forbid(unsafe_code)]

pub mod artifact;
pub mod client;
pub mod config;
pub mod deploy;
pub mod diff;
pub mod error;
pub mod identity;
pub mod storage;
pub mod types;
pub mod value;
pub mod wait;

// Re-export commonly used types at the crate root
pub use client::{FunctionClient, FunctionConfig, HttpFunctionClient, MockFunctionClient};
pub use config::{ApiConfig, DeployConfig, StorageConfig, WaitConfig};
pub use deploy::Deployer;
pub use error::{classify_remote, DeployError, DeployResult, ErrorClass, RemoteError};
pub use identity::IdentityClient;
pub use storage::{ArtifactUploader, MockUploader, S3Uploader, UploadedArtifact};
pub use types::{DeployOutcome, DeploymentRequest, PackageKind, PackageSource};
