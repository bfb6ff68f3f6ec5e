//! Client error types.

use thiserror::Error;

use freeslot_auth::{AuthError, ConfigError, StoreError};
use freeslot_calendar::CalendarError;
use freeslot_core::{TracingError, WindowError};

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configuration file or a setting is unusable.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required OAuth setting is missing or malformed.
    #[error("configuration error: {0}")]
    AuthConfig(#[from] ConfigError),

    /// No valid token could be obtained.
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    /// The credential file could not be read or written.
    #[error("credential store: {0}")]
    Store(#[from] StoreError),

    /// The calendar API call failed.
    #[error("calendar error: {0}")]
    Calendar(#[from] CalendarError),

    /// A date range or working window is invalid.
    #[error("invalid range: {0}")]
    Window(#[from] WindowError),

    /// Logging could not be initialized.
    #[error("logging setup failed: {0}")]
    Tracing(#[from] TracingError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes() {
        let err = ClientError::config("bad timezone");
        assert_eq!(err.to_string(), "configuration error: bad timezone");

        let err: ClientError = ConfigError::Missing { name: "CLIENT_ID" }.into();
        assert_eq!(
            err.to_string(),
            "configuration error: missing required setting CLIENT_ID"
        );

        let err: ClientError = AuthError::NoRefreshToken.into();
        assert!(err.to_string().starts_with("authentication failed"));
    }
}
