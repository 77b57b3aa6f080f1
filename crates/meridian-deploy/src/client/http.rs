//! HTTP client for the function control-plane API.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;

use crate::config::ApiConfig;
use crate::error::{DeployError, DeployResult, RemoteError};

use super::{
    CreateFunctionInput, FunctionClient, FunctionConfig, FunctionOutputs, UpdateCodeInput,
    UpdateConfigInput,
};

/// Error body returned by the control plane on failed calls.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// HTTP implementation of [`FunctionClient`].
#[derive(Debug, Clone)]
pub struct HttpFunctionClient {
    client: Client,
    base_url: String,
}

impl HttpFunctionClient {
    /// Create a client from configuration.
    ///
    /// The bearer token, timeout and user-agent all come from the config so
    /// every call carries the same identity.
    pub fn new(config: &ApiConfig) -> DeployResult<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| DeployError::Config(format!("invalid api token: {e}")))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| DeployError::Config(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.endpoint.trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Turn a non-success response into a [`RemoteError`], preserving the
    /// symbolic error code when the body carries one.
    async fn remote_error(response: Response) -> RemoteError {
        let status = response.status().as_u16();
        let fallback = response
            .status()
            .canonical_reason()
            .unwrap_or("request failed")
            .to_owned();

        match response.json::<ErrorBody>().await {
            Ok(body) => {
                let message = body.message.unwrap_or(fallback);
                match body.code {
                    Some(code) => RemoteError::named(code, message).with_status(status),
                    None => RemoteError::new(message).with_status(status),
                }
            }
            Err(_) => RemoteError::new(fallback).with_status(status),
        }
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RemoteError> {
        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }
        response
            .json()
            .await
            .map_err(|e| RemoteError::new(format!("failed to decode response: {e}")))
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, RemoteError> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::new(e.to_string()))?;
        Self::decode(response).await
    }
}

#[async_trait::async_trait]
impl FunctionClient for HttpFunctionClient {
    async fn get_function_configuration(
        &self,
        name: &str,
    ) -> Result<FunctionConfig, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/functions/{name}/configuration")))
            .send()
            .await
            .map_err(|e| RemoteError::new(e.to_string()))?;
        Self::decode(response).await
    }

    async fn create_function(
        &self,
        input: &CreateFunctionInput,
    ) -> Result<FunctionOutputs, RemoteError> {
        self.post_json("/v1/functions", input).await
    }

    async fn update_function_configuration(
        &self,
        input: &UpdateConfigInput,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .put(self.url(&format!(
                "/v1/functions/{}/configuration",
                input.function_name
            )))
            .json(input)
            .send()
            .await
            .map_err(|e| RemoteError::new(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::remote_error(response).await);
        }
        Ok(())
    }

    async fn update_function_code(
        &self,
        input: &UpdateCodeInput,
    ) -> Result<FunctionOutputs, RemoteError> {
        let response = self
            .client
            .put(self.url(&format!("/v1/functions/{}/code", input.function_name)))
            .json(input)
            .send()
            .await
            .map_err(|e| RemoteError::new(e.to_string()))?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_creation() {
        let config = ApiConfig::default();
        let client = HttpFunctionClient::new(&config);
        assert!(client.is_ok());
    }

    #[test]
    fn client_with_token() {
        let config = ApiConfig {
            token: Some("abc123".to_owned()),
            ..ApiConfig::default()
        };
        assert!(HttpFunctionClient::new(&config).is_ok());
    }

    #[test]
    fn base_url_is_normalised() {
        let config = ApiConfig {
            endpoint: "http://localhost:9001/".to_owned(),
            ..ApiConfig::default()
        };
        let client = HttpFunctionClient::new(&config).unwrap();
        assert_eq!(client.url("/v1/functions"), "http://localhost:9001/v1/functions");
    }
}
