//! Error types for credential management.
//!
//! - [`ConfigError`]: required OAuth settings are missing or malformed
//! - [`StoreError`]: the credential file could not be written or read
//! - [`AuthError`]: acquiring or renewing a bearer token failed

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Missing or invalid OAuth configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing required setting {name}")]
    Missing { name: &'static str },

    /// A setting is present but unusable.
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    /// Creates an invalid-setting error.
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Failure to persist or read the credential file.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem operation failed.
    #[error("failed to {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Credential could not be serialized.
    #[error("failed to serialize credential: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The file exists but does not hold a usable credential.
    #[error("credential file {path} is unreadable: {reason}")]
    Unreadable { path: PathBuf, reason: String },
}

impl StoreError {
    pub(crate) fn io(
        action: &'static str,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }
}

/// Failure to obtain a valid bearer token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Configuration needed by the flow is missing.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The interactive grant was not completed in time.
    #[error("authorization not completed within {}s", .waited.as_secs())]
    Timeout { waited: Duration },

    /// The token endpoint answered with a non-success status.
    #[error("token endpoint rejected {grant} request ({status}): {body}")]
    Endpoint {
        grant: &'static str,
        status: u16,
        body: String,
    },

    /// The token endpoint answered with an unparseable body.
    #[error("malformed token response: {message}")]
    MalformedResponse { message: String },

    /// The token endpoint could not be reached.
    #[error("token endpoint unreachable: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The user or provider refused the authorization request.
    #[error("authorization denied: {reason}")]
    Denied { reason: String },

    /// The loopback listener could not be started.
    #[error("authorization listener failed on {address}: {source}")]
    Listener {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The listener went away without completing the grant.
    #[error("authorization listener stopped before completing")]
    ListenerClosed,

    /// The refresh token is missing, so renewal needs a new interactive grant.
    #[error("no refresh token available; run the authorization flow")]
    NoRefreshToken,
}

impl AuthError {
    /// Creates a network error from a reqwest failure.
    pub fn network(context: &str, source: reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            format!("{}: request timeout", context)
        } else if source.is_connect() {
            format!("{}: connection failed: {}", context, source)
        } else {
            format!("{}: {}", context, source)
        };
        Self::Network {
            message,
            source: Some(source),
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            message: message.into(),
        }
    }

    /// Returns true if repeating the operation may succeed.
    ///
    /// The broker never retries on its own; this is advice for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Network { .. } | Self::ListenerClosed => true,
            Self::Endpoint { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns the HTTP status retained from the token endpoint, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Endpoint { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// A specialized Result type for credential operations.
pub type AuthResult<T> = Result<T, AuthError>;
