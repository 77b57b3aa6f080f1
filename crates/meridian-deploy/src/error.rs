//! Error types and the shared remote-failure classifier.
//!
//! Every remote call site in the deployment flow maps failures through
//! [`classify_remote`] so the remediation categories and operator-facing
//! messages stay identical across create, configuration update, code update
//! and both readiness waits.

use std::fmt;

/// Result type alias using [`DeployError`].
pub type DeployResult<T> = Result<T, DeployError>;

/// A raw failure returned by a remote collaborator.
///
/// Carries the optional symbolic error name and transport status code that
/// the control plane attaches to failed calls, plus a human-readable message.
#[derive(Debug, Clone)]
pub struct RemoteError {
    /// Symbolic error name (e.g. `ResourceNotFoundException`), if supplied.
    pub name: Option<String>,
    /// HTTP status code of the failed call, if the call reached the server.
    pub status: Option<u16>,
    /// Human-readable message.
    pub message: String,
}

impl RemoteError {
    /// Create an error with only a message (transport-level failures).
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: None,
            status: None,
            message: message.into(),
        }
    }

    /// Create an error carrying a symbolic name.
    #[must_use]
    pub fn named(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            status: None,
            message: message.into(),
        }
    }

    /// Attach a transport status code.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Whether this failure indicates the target resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(
            self.name.as_deref(),
            Some("ResourceNotFoundException" | "NotFound")
        ) || self.status == Some(404)
    }

    /// Whether this failure is a 403-equivalent permission denial.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        self.status == Some(403)
    }

    /// Whether this failure is a rate-limit rejection.
    #[must_use]
    pub fn is_throttling(&self) -> bool {
        matches!(
            self.name.as_deref(),
            Some("ThrottlingException" | "TooManyRequestsException")
        ) || self.status == Some(429)
    }

    /// Server-side fault (5xx).
    #[must_use]
    pub fn server_fault_status(&self) -> Option<u16> {
        self.status.filter(|s| *s >= 500)
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, self.status) {
            (Some(name), Some(status)) => {
                write!(f, "{name} ({status}): {}", self.message)
            }
            (Some(name), None) => write!(f, "{name}: {}", self.message),
            (None, Some(status)) => write!(f, "status {status}: {}", self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

/// Remediation category of a classified failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Rate limit exceeded; the transport's retries are exhausted.
    RateLimited,
    /// Server-side fault (5xx).
    ServerFault,
    /// Caller lacks permission for the operation.
    PermissionDenied,
    /// Target resource does not exist.
    NotFound,
    /// A bounded wait ran out of budget.
    Timeout,
    /// Anything else.
    Generic,
    /// Fatal precondition failure caught before any remote call.
    UserInput,
}

/// Errors produced by the deployment flow.
///
/// Variants carry fully-formed operator-facing messages; the variant itself
/// is the remediation category.
#[derive(Debug, Clone, thiserror::Error)]
pub enum DeployError {
    /// Rate limit exceeded and the transport's retry budget is spent.
    #[error("Rate limit exceeded and maximum retries reached: {0}")]
    RateLimited(String),

    /// Server-side fault.
    #[error("Server error ({status}): {message}. All retry attempts failed.")]
    ServerFault {
        /// HTTP status of the failed call.
        status: u16,
        /// Message from the control plane.
        message: String,
    },

    /// Permission denied.
    #[error("{0}")]
    PermissionDenied(String),

    /// Resource not found.
    #[error("{0}")]
    NotFound(String),

    /// A bounded wait timed out.
    #[error("{0}")]
    Timeout(String),

    /// Unclassified failure with a step-specific context prefix.
    #[error("{context}: {message}")]
    Generic {
        /// Step-specific prefix, e.g. "Failed to create function".
        context: String,
        /// Underlying message.
        message: String,
    },

    /// Invalid or inconsistent caller input; no remote call was made.
    #[error("{0}")]
    UserInput(String),

    /// Local artifact packaging failure.
    #[error("failed to package code artifacts: {0}")]
    Package(String),

    /// Configuration loading failure.
    #[error("configuration error: {0}")]
    Config(String),
}

impl DeployError {
    /// Create a user-input error.
    #[must_use]
    pub fn user_input(msg: impl Into<String>) -> Self {
        Self::UserInput(msg.into())
    }

    /// Create a generic error with a step-specific context prefix.
    #[must_use]
    pub fn generic(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Generic {
            context: context.into(),
            message: message.into(),
        }
    }

    /// The remediation category of this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::RateLimited(_) => ErrorClass::RateLimited,
            Self::ServerFault { .. } => ErrorClass::ServerFault,
            Self::PermissionDenied(_) => ErrorClass::PermissionDenied,
            Self::NotFound(_) => ErrorClass::NotFound,
            Self::Timeout(_) => ErrorClass::Timeout,
            Self::Generic { .. } | Self::Package(_) | Self::Config(_) => ErrorClass::Generic,
            Self::UserInput(_) => ErrorClass::UserInput,
        }
    }

    /// Whether retrying the whole run may succeed without operator action.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(self.class(), ErrorClass::RateLimited | ErrorClass::ServerFault)
    }
}

/// Map a raw remote failure to a [`DeployError`].
///
/// The first three rows of the table are context-independent; only the
/// fallthrough row uses the step-specific `context` prefix. Not-found and
/// permission failures inside the readiness waits are built directly by the
/// pollers with their own messages, so they do not appear here.
#[must_use]
pub fn classify_remote(error: &RemoteError, context: &str) -> DeployError {
    if error.is_throttling() {
        DeployError::RateLimited(error.message.clone())
    } else if let Some(status) = error.server_fault_status() {
        DeployError::ServerFault {
            status,
            message: error.message.clone(),
        }
    } else if error.name.as_deref() == Some("AccessDeniedException") {
        DeployError::PermissionDenied(format!(
            "Permissions error: {}. Check IAM roles.",
            error.message
        ))
    } else {
        DeployError::generic(context, error.message.clone())
    }
}
