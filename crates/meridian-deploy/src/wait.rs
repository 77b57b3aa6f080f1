//! Readiness polling for newly created and freshly updated functions.
//!
//! Both waits poll the configuration snapshot against a deadline. Transient
//! fetch failures are logged and retried; not-found and permission failures
//! abort immediately because waiting longer cannot fix them.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

use crate::client::FunctionClient;
use crate::error::{DeployError, DeployResult, RemoteError};

/// Upper bound on any single wait.
pub const MAX_WAIT_MINUTES: u64 = 30;

/// Poll cadence while waiting for a created function to become active.
const ACTIVE_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Poll cadence while waiting for an update to settle.
const UPDATE_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Clamp a caller-supplied wait budget to [`MAX_WAIT_MINUTES`].
fn clamp_wait_minutes(minutes: u64) -> u64 {
    if minutes > MAX_WAIT_MINUTES {
        info!(
            requested = minutes,
            capped = MAX_WAIT_MINUTES,
            "wait time capped to maximum"
        );
        MAX_WAIT_MINUTES
    } else {
        minutes
    }
}

/// Outcome of one settle poll that needs caller-side mapping.
#[derive(Debug)]
enum WaitError {
    Timeout,
    Remote(RemoteError),
}

/// Wait until a function reports the `Active` state.
///
/// Intended for the post-create window where the function sits in `Pending`
/// while resources are provisioned. A `Failed` state aborts immediately with
/// the reported reason.
pub async fn wait_until_active(
    client: &dyn FunctionClient,
    name: &str,
    minutes: u64,
) -> DeployResult<()> {
    let minutes = clamp_wait_minutes(minutes);
    let deadline = Instant::now() + Duration::from_secs(minutes * 60);
    let mut last_state: Option<String> = None;

    info!(function = %name, minutes, "waiting for function to become active");

    while Instant::now() < deadline {
        match client.get_function_configuration(name).await {
            Ok(config) => match config.state() {
                Some("Active") => {
                    info!(function = %name, "function is active");
                    return Ok(());
                }
                Some("Failed") => {
                    let reason = config.state_reason().unwrap_or("unknown").to_owned();
                    return Err(DeployError::generic(
                        format!("Function {name} failed to become active"),
                        reason,
                    ));
                }
                state => {
                    let state = state.unwrap_or("unknown").to_owned();
                    if last_state.as_deref() != Some(state.as_str()) {
                        info!(function = %name, state = %state, "function state");
                        last_state = Some(state);
                    }
                }
            },
            Err(e) if e.is_not_found() => {
                return Err(DeployError::NotFound(format!("Function {name} not found")));
            }
            Err(e) if e.is_permission_denied() => {
                return Err(DeployError::PermissionDenied(format!(
                    "Permission denied while checking function {name} status"
                )));
            }
            Err(e) => {
                warn!(function = %name, error = %e, "transient error while polling function state");
            }
        }

        tokio::time::sleep(ACTIVE_POLL_INTERVAL).await;
    }

    Err(DeployError::Timeout(format!(
        "Timed out waiting for function {name} to become active after {minutes} minutes"
    )))
}

/// Wait until the most recent update reports `Successful`.
///
/// When the control plane rejects the poll because the function is still in
/// the `Pending` lifecycle state, the wait falls back to
/// [`wait_until_active`] and retries once the function exists properly.
pub async fn wait_until_update_settled(
    client: &dyn FunctionClient,
    name: &str,
    minutes: u64,
) -> DeployResult<()> {
    let minutes = clamp_wait_minutes(minutes);

    info!(function = %name, minutes, "waiting for function update to complete");

    match wait_for_update_success(client, name, minutes).await {
        Ok(()) => {
            info!(function = %name, "function update completed");
            Ok(())
        }
        Err(WaitError::Timeout) => Err(DeployError::Timeout(format!(
            "Timed out waiting for function {name} update to complete after {minutes} minutes"
        ))),
        Err(WaitError::Remote(e)) if e.is_not_found() => {
            Err(DeployError::NotFound(format!("Function {name} not found")))
        }
        Err(WaitError::Remote(e)) if e.is_permission_denied() => {
            Err(DeployError::PermissionDenied(format!(
                "Permission denied while checking function {name} status"
            )))
        }
        Err(WaitError::Remote(e))
            if e.message.contains("currently in the following state: 'Pending'") =>
        {
            warn!(
                function = %name,
                "function still pending during update wait, waiting for it to become active"
            );
            wait_until_active(client, name, minutes).await
        }
        Err(WaitError::Remote(e)) => Err(DeployError::generic(
            format!("Error waiting for function {name} update"),
            e.message,
        )),
    }
}

async fn wait_for_update_success(
    client: &dyn FunctionClient,
    name: &str,
    minutes: u64,
) -> Result<(), WaitError> {
    let deadline = Instant::now() + Duration::from_secs(minutes * 60);

    while Instant::now() < deadline {
        match client.get_function_configuration(name).await {
            Ok(config) => match config.last_update_status() {
                Some("Successful") => return Ok(()),
                Some("Failed") => {
                    let reason = config
                        .last_update_status_reason()
                        .unwrap_or("unknown")
                        .to_owned();
                    return Err(WaitError::Remote(RemoteError::new(format!(
                        "The function update failed: {reason}"
                    ))));
                }
                _ => {}
            },
            Err(e) if e.is_not_found() || e.is_permission_denied() => {
                return Err(WaitError::Remote(e));
            }
            Err(e) if e.message.contains("currently in the following state") => {
                return Err(WaitError::Remote(e));
            }
            Err(e) => {
                warn!(function = %name, error = %e, "transient error while polling update status");
            }
        }

        tokio::time::sleep(UPDATE_POLL_INTERVAL).await;
    }

    Err(WaitError::Timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{FunctionConfig, MockFunctionClient};
    use crate::error::ErrorClass;
    use serde_json::json;

    fn snapshot(body: serde_json::Value) -> FunctionConfig {
        FunctionConfig::from_value(body)
    }

    #[tokio::test(start_paused = true)]
    async fn active_after_pending() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({"State": "Active"})));
        mock.push_get(Ok(snapshot(json!({"State": "Pending"}))));
        mock.push_get(Ok(snapshot(json!({"State": "Pending"}))));

        wait_until_active(&mock, "fn", 5).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_state_aborts_with_reason() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({
            "State": "Failed",
            "StateReason": "image pull failure"
        })));

        let err = wait_until_active(&mock, "fn", 5).await.unwrap_err();
        assert!(err.to_string().contains("image pull failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn active_wait_times_out() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({"State": "Pending"})));

        let err = wait_until_active(&mock, "fn", 1).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert_eq!(
            err.to_string(),
            "Timed out waiting for function fn to become active after 1 minutes"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn active_wait_fails_fast_on_not_found() {
        let mock = MockFunctionClient::absent();

        let err = wait_until_active(&mock, "fn", 5).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert_eq!(err.to_string(), "Function fn not found");
    }

    #[tokio::test(start_paused = true)]
    async fn active_wait_fails_fast_on_permission_denied() {
        let mock = MockFunctionClient::default();
        mock.set_default_get(Err(
            crate::error::RemoteError::new("denied").with_status(403)
        ));

        let err = wait_until_active(&mock, "fn", 5).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::PermissionDenied);
        assert_eq!(
            err.to_string(),
            "Permission denied while checking function fn status"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_are_retried_once_per_failure() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({"State": "Active"})));
        mock.push_get(Err(crate::error::RemoteError::new("connection reset")));

        wait_until_active(&mock, "fn", 5).await.unwrap();

        // One failed poll plus the successful retry, nothing more.
        assert_eq!(mock.get_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_budget_is_clamped() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({"State": "Pending"})));

        let err = wait_until_active(&mock, "fn", 60).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Timeout);
        assert_eq!(
            err.to_string(),
            "Timed out waiting for function fn to become active after 30 minutes"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn update_settles_after_in_progress() {
        let mock = MockFunctionClient::with_configuration(snapshot(
            json!({"LastUpdateStatus": "Successful"}),
        ));
        mock.push_get(Ok(snapshot(json!({"LastUpdateStatus": "InProgress"}))));

        wait_until_update_settled(&mock, "fn", 5).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_update_reports_reason() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({
            "LastUpdateStatus": "Failed",
            "LastUpdateStatusReason": "broken layer"
        })));

        let err = wait_until_update_settled(&mock, "fn", 5).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Generic);
        assert!(err.to_string().contains("broken layer"));
    }

    #[tokio::test(start_paused = true)]
    async fn update_wait_times_out() {
        let mock = MockFunctionClient::with_configuration(snapshot(
            json!({"LastUpdateStatus": "InProgress"}),
        ));

        let err = wait_until_update_settled(&mock, "fn", 1).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn update_wait_fails_fast_on_not_found() {
        let mock = MockFunctionClient::absent();

        let err = wait_until_update_settled(&mock, "fn", 5).await.unwrap_err();
        assert_eq!(err.class(), ErrorClass::NotFound);
        assert_eq!(err.to_string(), "Function fn not found");
    }

    #[tokio::test(start_paused = true)]
    async fn pending_function_falls_back_to_active_wait() {
        let mock = MockFunctionClient::with_configuration(snapshot(json!({"State": "Active"})));
        mock.push_get(Err(crate::error::RemoteError::new(
            "The operation cannot be performed at this time. The function is currently in the following state: 'Pending'",
        )));

        wait_until_update_settled(&mock, "fn", 5).await.unwrap();
    }
}
