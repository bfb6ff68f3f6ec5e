//! OAuth2 credential management for freeslot.
//!
//! - [`CredentialStore`] - durable, atomically written credential file
//! - [`CredentialBroker`] - returns a valid bearer token, refreshing or
//!   running the browser grant as needed
//! - [`AuthorizationListener`] - loopback HTTP listener for the redirect
//! - [`TokenEndpoint`] - the identity provider's token endpoint
//!
//! # Architecture
//!
//! ```text
//!   caller ──► CredentialBroker ──► CredentialStore (load / save)
//!                    │
//!          ┌─────────┴──────────┐
//!          ▼                    ▼
//!    TokenEndpoint      AuthorizationListener
//!    (refresh)          (browser redirect) ──► TokenEndpoint (exchange)
//! ```
//!
//! # Example
//!
//! ```ignore
//! use freeslot_auth::{AuthConfig, CredentialBroker};
//!
//! let broker = CredentialBroker::new(AuthConfig::from_env()?)?;
//! let token = broker.get_valid_credential().await?;
//! ```

pub mod broker;
pub mod config;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod listener;
pub mod store;

#[cfg(test)]
mod test_support;

pub use broker::{CredentialBroker, CredentialState, CredentialStatus, UrlOpener};
pub use config::{AuthConfig, OAuthCredentials};
pub use credential::Credential;
pub use endpoint::{BoxFuture, OAuthClient, PkceFlow, TokenEndpoint, TokenResponse};
pub use error::{AuthError, AuthResult, ConfigError, StoreError};
pub use listener::{AuthorizationListener, CallbackHandler, CallbackResponse};
pub use store::CredentialStore;
