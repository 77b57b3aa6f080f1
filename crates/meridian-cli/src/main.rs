//! Meridian CLI - deploy serverless functions to a Meridian control plane.

mod inputs;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use meridian_deploy::{
    DeployConfig, Deployer, HttpFunctionClient, IdentityClient, S3Uploader,
};

#[derive(Parser)]
#[command(name = "meridian")]
#[command(about = "Deploy a serverless function")]
#[command(version)]
pub struct Cli {
    /// Name of the function to deploy
    #[arg(long)]
    pub function_name: String,

    /// Package type: Zip or Image
    #[arg(long, default_value = "Zip")]
    pub package_type: String,

    /// Directory containing the code artifacts to package (Zip only)
    #[arg(long)]
    pub code_artifacts_dir: Option<PathBuf>,

    /// Container image reference (Image only)
    #[arg(long)]
    pub image_uri: Option<String>,

    /// Handler entry point (Zip only)
    #[arg(long)]
    pub handler: Option<String>,

    /// Runtime identifier (Zip only)
    #[arg(long)]
    pub runtime: Option<String>,

    /// Execution role ARN; required when creating a new function
    #[arg(long)]
    pub role: Option<String>,

    /// Function description
    #[arg(long)]
    pub function_description: Option<String>,

    /// Memory limit in MB
    #[arg(long)]
    pub memory_size: Option<u32>,

    /// Execution timeout in seconds
    #[arg(long)]
    pub timeout: Option<u32>,

    /// Ephemeral storage size in MB
    #[arg(long)]
    pub ephemeral_storage: Option<u32>,

    /// Environment variables as a JSON object of strings
    #[arg(long)]
    pub environment: Option<String>,

    /// VPC configuration as JSON
    #[arg(long)]
    pub vpc_config: Option<String>,

    /// Dead-letter configuration as JSON
    #[arg(long)]
    pub dead_letter_config: Option<String>,

    /// Tracing configuration as JSON
    #[arg(long)]
    pub tracing_config: Option<String>,

    /// Layer ARNs as a JSON array (Zip only)
    #[arg(long)]
    pub layers: Option<String>,

    /// Filesystem configurations as JSON
    #[arg(long)]
    pub file_system_configs: Option<String>,

    /// Image configuration as JSON (Image only)
    #[arg(long)]
    pub image_config: Option<String>,

    /// Snapshot-start configuration as JSON
    #[arg(long)]
    pub snap_start: Option<String>,

    /// Logging configuration as JSON
    #[arg(long)]
    pub logging_config: Option<String>,

    /// Tags as a JSON object of strings
    #[arg(long)]
    pub tags: Option<String>,

    /// KMS key ARN for configuration at rest
    #[arg(long)]
    pub kms_key_arn: Option<String>,

    /// KMS key ARN for uploaded code at rest
    #[arg(long)]
    pub source_kms_key_arn: Option<String>,

    /// Code-signing configuration ARN
    #[arg(long)]
    pub code_signing_config_arn: Option<String>,

    /// Instruction set architectures (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub architectures: Option<Vec<String>>,

    /// Publish a new version on deploy
    #[arg(long)]
    pub publish: bool,

    /// Revision id for optimistic locking
    #[arg(long)]
    pub revision_id: Option<String>,

    /// Validate the code update without applying changes
    #[arg(long)]
    pub dry_run: bool,

    /// S3 bucket to stage the code archive through (Zip only)
    #[arg(long)]
    pub s3_bucket: Option<String>,

    /// S3 key for the code archive; auto-generated when omitted
    #[arg(long)]
    pub s3_key: Option<String>,

    /// Region to deploy into
    #[arg(long, env = "MERIDIAN_REGION")]
    pub region: Option<String>,

    /// Commit hash embedded in generated archive keys
    #[arg(long, env = "COMMIT_SHA")]
    pub commit_sha: Option<String>,

    /// Path to a configuration file (defaults to meridian.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => DeployConfig::from_file(path)?,
        None => DeployConfig::load()?,
    };
    if let Some(region) = &cli.region {
        config.region = region.clone();
    }

    let request = inputs::build_request(cli)?;

    let client = Arc::new(HttpFunctionClient::new(&config.api)?);
    let identity = IdentityClient::new(&config.api)?;
    let uploader = Arc::new(S3Uploader::new(
        config.region.clone(),
        config.storage.clone(),
        identity,
        &config.api.user_agent,
    )?);

    let mut deployer = Deployer::new(client, uploader, &config);
    if let Some(sha) = &cli.commit_sha {
        deployer = deployer.with_commit_sha(sha.clone());
    }

    let outcome = deployer.run(&request).await?;

    if let Some(arn) = &outcome.function_arn {
        println!("function-arn={arn}");
    }
    if let Some(version) = &outcome.version {
        println!("version={version}");
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(&cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
