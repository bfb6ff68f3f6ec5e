//! Error types for calendar operations.

use freeslot_auth::AuthError;
use freeslot_core::WindowError;
use thiserror::Error;

/// An error talking to the calendar API or preparing a request for it.
#[derive(Debug, Error)]
pub enum CalendarError {
    /// No valid bearer token could be obtained.
    #[error("credential error: {0}")]
    Auth(#[from] AuthError),

    /// The API rejected the bearer token (401).
    #[error("access token expired or invalid")]
    Authentication,

    /// The token is valid but lacks access (403).
    #[error("access denied: {body}")]
    Authorization { body: String },

    /// Too many requests (429).
    #[error("rate limit exceeded{}", retry_suffix(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    /// Any other non-success status.
    #[error("API error ({status}): {body}")]
    Server { status: u16, body: String },

    /// The API could not be reached.
    #[error("request failed: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The API answered with something we cannot parse.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// A single calendar in a free/busy answer reported an error.
    #[error("calendar {calendar_id}: {reason}")]
    Calendar { calendar_id: String, reason: String },

    /// An event request failed validation before sending.
    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    /// The requested window or date span is invalid.
    #[error(transparent)]
    Window(#[from] WindowError),
}

impl CalendarError {
    /// Creates a network error from a reqwest failure.
    pub fn network(source: reqwest::Error) -> Self {
        let message = if source.is_timeout() {
            "request timeout".to_string()
        } else if source.is_connect() {
            format!("connection failed: {}", source)
        } else {
            source.to_string()
        };
        Self::Network {
            message,
            source: Some(source),
        }
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }

    /// Creates an invalid event error.
    pub fn invalid_event(reason: impl Into<String>) -> Self {
        Self::InvalidEvent {
            reason: reason.into(),
        }
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Auth(e) => e.is_retryable(),
            Self::RateLimited { .. } | Self::Network { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

fn retry_suffix(retry_after: &Option<u64>) -> String {
    retry_after
        .map(|secs| format!(", retry after {} seconds", secs))
        .unwrap_or_default()
}

/// A specialized Result type for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;
