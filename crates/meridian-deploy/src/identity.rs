//! Caller identity resolution.
//!
//! The uploader uses the caller's account id to verify bucket ownership
//! before staging code through it. Resolution failures degrade to `None`
//! with a warning; the ownership check itself decides whether that is fatal.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::config::ApiConfig;
use crate::error::{DeployError, DeployResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IdentityResponse {
    account_id: String,
}

/// Resolves the account id of the configured credentials.
#[derive(Debug, Clone)]
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

impl IdentityClient {
    /// Create a client from configuration.
    pub fn new(config: &ApiConfig) -> DeployResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DeployError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_owned(),
        })
    }

    /// The caller's account id, or `None` when it cannot be determined.
    pub async fn account_id(&self) -> Option<String> {
        let url = format!("{}/v1/identity", self.base_url);

        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "could not determine account id");
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(status = %response.status(), "could not determine account id");
            return None;
        }

        match response.json::<IdentityResponse>().await {
            Ok(identity) => Some(identity.account_id),
            Err(e) => {
                warn!(error = %e, "could not decode identity response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let config = ApiConfig::default();
        assert!(IdentityClient::new(&config).is_ok());
    }

    #[tokio::test]
    async fn unreachable_endpoint_degrades_to_none() {
        let config = ApiConfig {
            endpoint: "http://127.0.0.1:1".to_owned(),
            timeout_secs: 1,
            ..ApiConfig::default()
        };
        let client = IdentityClient::new(&config).unwrap();
        assert!(client.account_id().await.is_none());
    }
}
