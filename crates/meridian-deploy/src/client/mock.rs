//! Mock function client for testing.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::RemoteError;

use super::{
    CreateFunctionInput, FunctionClient, FunctionConfig, FunctionOutputs, UpdateCodeInput,
    UpdateConfigInput,
};

/// In-memory [`FunctionClient`] that replays scripted responses and records
/// every call it receives.
#[derive(Debug, Default)]
pub struct MockFunctionClient {
    state: Mutex<MockState>,
}

#[derive(Debug, Default)]
struct MockState {
    /// Responses consumed in order by `get_function_configuration`; once
    /// drained, `default_get` answers.
    get_queue: VecDeque<Result<FunctionConfig, RemoteError>>,
    default_get: Option<Result<FunctionConfig, RemoteError>>,
    create_response: Option<Result<FunctionOutputs, RemoteError>>,
    config_update_response: Option<Result<(), RemoteError>>,
    code_update_response: Option<Result<FunctionOutputs, RemoteError>>,
    get_calls: usize,
    created: Vec<CreateFunctionInput>,
    config_updates: Vec<UpdateConfigInput>,
    code_updates: Vec<UpdateCodeInput>,
}

fn not_found() -> RemoteError {
    RemoteError::named("ResourceNotFoundException", "Function not found").with_status(404)
}

fn poisoned() -> RemoteError {
    RemoteError::new("lock poisoned")
}

impl MockFunctionClient {
    /// A client for which the function does not exist.
    #[must_use]
    pub fn absent() -> Self {
        let mock = Self::default();
        mock.set_default_get(Err(not_found()));
        mock
    }

    /// A client that always answers configuration fetches with `config`.
    #[must_use]
    pub fn with_configuration(config: FunctionConfig) -> Self {
        let mock = Self::default();
        mock.set_default_get(Ok(config));
        mock
    }

    /// Queue one response for the next configuration fetch.
    pub fn push_get(&self, response: Result<FunctionConfig, RemoteError>) {
        if let Ok(mut state) = self.state.lock() {
            state.get_queue.push_back(response);
        }
    }

    /// Set the fallback response for configuration fetches.
    pub fn set_default_get(&self, response: Result<FunctionConfig, RemoteError>) {
        if let Ok(mut state) = self.state.lock() {
            state.default_get = Some(response);
        }
    }

    /// Set the response for create calls.
    pub fn set_create_response(&self, response: Result<FunctionOutputs, RemoteError>) {
        if let Ok(mut state) = self.state.lock() {
            state.create_response = Some(response);
        }
    }

    /// Set the response for configuration-update calls.
    pub fn set_config_update_response(&self, response: Result<(), RemoteError>) {
        if let Ok(mut state) = self.state.lock() {
            state.config_update_response = Some(response);
        }
    }

    /// Set the response for code-update calls.
    pub fn set_code_update_response(&self, response: Result<FunctionOutputs, RemoteError>) {
        if let Ok(mut state) = self.state.lock() {
            state.code_update_response = Some(response);
        }
    }

    /// Number of configuration fetches received so far.
    #[must_use]
    pub fn get_calls(&self) -> usize {
        self.state.lock().map(|s| s.get_calls).unwrap_or_default()
    }

    /// Create payloads received so far.
    #[must_use]
    pub fn created(&self) -> Vec<CreateFunctionInput> {
        self.state.lock().map(|s| s.created.clone()).unwrap_or_default()
    }

    /// Configuration-update payloads received so far.
    #[must_use]
    pub fn config_updates(&self) -> Vec<UpdateConfigInput> {
        self.state
            .lock()
            .map(|s| s.config_updates.clone())
            .unwrap_or_default()
    }

    /// Code-update payloads received so far.
    #[must_use]
    pub fn code_updates(&self) -> Vec<UpdateCodeInput> {
        self.state
            .lock()
            .map(|s| s.code_updates.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl FunctionClient for MockFunctionClient {
    async fn get_function_configuration(
        &self,
        _name: &str,
    ) -> Result<FunctionConfig, RemoteError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.get_calls += 1;
        if let Some(response) = state.get_queue.pop_front() {
            return response;
        }
        state.default_get.clone().unwrap_or_else(|| Err(not_found()))
    }

    async fn create_function(
        &self,
        input: &CreateFunctionInput,
    ) -> Result<FunctionOutputs, RemoteError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.created.push(input.clone());
        state.create_response.clone().unwrap_or_else(|| {
            Ok(FunctionOutputs {
                function_arn: Some(format!(
                    "arn:aws:lambda:us-east-1:123456789012:function:{}",
                    input.function_name
                )),
                version: Some("1".to_owned()),
            })
        })
    }

    async fn update_function_configuration(
        &self,
        input: &UpdateConfigInput,
    ) -> Result<(), RemoteError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.config_updates.push(input.clone());
        state.config_update_response.clone().unwrap_or(Ok(()))
    }

    async fn update_function_code(
        &self,
        input: &UpdateCodeInput,
    ) -> Result<FunctionOutputs, RemoteError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        state.code_updates.push(input.clone());
        state.code_update_response.clone().unwrap_or_else(|| {
            Ok(FunctionOutputs {
                function_arn: Some(format!(
                    "arn:aws:lambda:us-east-1:123456789012:function:{}",
                    input.function_name
                )),
                version: Some("2".to_owned()),
            })
        })
    }
}
