//! OAuth configuration.
//!
//! Settings come from environment-style variables (the names the identity
//! provider setup documents use) and can be overridden with builder methods.
//! A missing required value fails fast with [`ConfigError::Missing`] instead
//! of producing a malformed request later.

use std::path::{Path, PathBuf};
use std::time::Duration;

use url::Url;

use crate::error::ConfigError;

/// Environment variable holding the OAuth client ID.
pub const ENV_CLIENT_ID: &str = "CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "CLIENT_SECRET";
/// Environment variable holding the loopback redirect URI.
pub const ENV_REDIRECT_URI: &str = "REDIRECT_URI";
/// Environment variable holding the authorization endpoint.
pub const ENV_AUTH_URL: &str = "AUTH_URL";
/// Environment variable holding the token endpoint.
pub const ENV_TOKEN_URL: &str = "TOKEN_URL";
/// Environment variable overriding the credential file location.
pub const ENV_TOKEN_FILE: &str = "FREESLOT_TOKEN_FILE";
/// Environment variable overriding the requested scopes (space separated).
pub const ENV_SCOPES: &str = "FREESLOT_SCOPES";

/// OAuth 2.0 client credentials.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Checks that neither value is blank.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: ENV_CLIENT_ID,
            });
        }
        if self.client_secret.trim().is_empty() {
            return Err(ConfigError::Missing {
                name: ENV_CLIENT_SECRET,
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Everything the credential broker needs to talk to the identity provider.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Client credentials.
    pub credentials: OAuthCredentials,
    /// Where the provider redirects after consent; the listener binds here.
    pub redirect_uri: Url,
    /// Authorization endpoint the user is sent to.
    pub auth_url: Url,
    /// Token endpoint for code exchange and refresh.
    pub token_url: Url,
    /// Scopes requested during the interactive grant.
    pub scopes: Vec<String>,
    /// Credential file location.
    pub token_path: PathBuf,
    /// Upper bound on waiting for the interactive grant.
    pub grant_timeout: Duration,
    /// Timeout applied to each token endpoint request.
    pub request_timeout: Duration,
    /// Tokens are treated as expired this long before their literal expiry.
    pub expiry_margin: Duration,
}

impl AuthConfig {
    /// Scopes requested by default: identity plus calendar read and write.
    pub const DEFAULT_SCOPES: [&'static str; 4] = [
        "https://www.googleapis.com/auth/userinfo.email",
        "https://www.googleapis.com/auth/userinfo.profile",
        "https://www.googleapis.com/auth/calendar.readonly",
        "https://www.googleapis.com/auth/calendar.events",
    ];

    /// Default bound on the interactive grant.
    pub const DEFAULT_GRANT_TIMEOUT: Duration = Duration::from_secs(300);

    /// Default token endpoint request timeout.
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

    /// Default early-expiry margin.
    pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

    /// Creates a configuration from explicit values.
    pub fn new(
        credentials: OAuthCredentials,
        redirect_uri: &str,
        auth_url: &str,
        token_url: &str,
    ) -> Result<Self, ConfigError> {
        credentials.validate()?;
        let config = Self {
            credentials,
            redirect_uri: parse_url(ENV_REDIRECT_URI, redirect_uri)?,
            auth_url: parse_url(ENV_AUTH_URL, auth_url)?,
            token_url: parse_url(ENV_TOKEN_URL, token_url)?,
            scopes: Self::DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            token_path: Self::default_token_path(),
            grant_timeout: Self::DEFAULT_GRANT_TIMEOUT,
            request_timeout: Self::DEFAULT_REQUEST_TIMEOUT,
            expiry_margin: Self::DEFAULT_EXPIRY_MARGIN,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through an arbitrary variable lookup.
    ///
    /// Blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing { name })
        };

        let credentials =
            OAuthCredentials::new(required(ENV_CLIENT_ID)?, required(ENV_CLIENT_SECRET)?);
        let mut config = Self::new(
            credentials,
            &required(ENV_REDIRECT_URI)?,
            &required(ENV_AUTH_URL)?,
            &required(ENV_TOKEN_URL)?,
        )?;

        if let Some(path) = lookup(ENV_TOKEN_FILE).filter(|v| !v.trim().is_empty()) {
            config.token_path = PathBuf::from(path);
        }
        if let Some(scopes) = lookup(ENV_SCOPES).filter(|v| !v.trim().is_empty()) {
            config = config.with_scopes(scopes.split_whitespace().map(String::from).collect());
        }
        config.validate()?;
        Ok(config)
    }

    /// Returns the default credential file location.
    ///
    /// `~/.local/share/freeslot/credential.json`, or the current directory
    /// when no data directory is known.
    pub fn default_token_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("freeslot")
            .join("credential.json")
    }

    /// Sets the credential file location.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Sets the requested scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Sets the interactive grant timeout.
    pub fn with_grant_timeout(mut self, timeout: Duration) -> Self {
        self.grant_timeout = timeout;
        self
    }

    /// Sets the token endpoint request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the early-expiry margin.
    pub fn with_expiry_margin(mut self, margin: Duration) -> Self {
        self.expiry_margin = margin;
        self
    }

    /// Returns the credential file location.
    pub fn token_path(&self) -> &Path {
        &self.token_path
    }

    /// Returns the `host:port` the authorization listener binds to.
    pub fn listener_address(&self) -> Result<String, ConfigError> {
        let host = self
            .redirect_uri
            .host_str()
            .ok_or_else(|| ConfigError::invalid(ENV_REDIRECT_URI, "no host"))?;
        let port = self
            .redirect_uri
            .port_or_known_default()
            .ok_or_else(|| ConfigError::invalid(ENV_REDIRECT_URI, "no port"))?;
        Ok(format!("{}:{}", host, port))
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.credentials.validate()?;

        if self.redirect_uri.scheme() != "http" {
            return Err(ConfigError::invalid(
                ENV_REDIRECT_URI,
                "the loopback listener only serves plain http",
            ));
        }
        self.listener_address()?;

        if self.scopes.is_empty() {
            return Err(ConfigError::invalid(ENV_SCOPES, "at least one scope is required"));
        }

        if self.grant_timeout.is_zero() {
            return Err(ConfigError::invalid("grant_timeout", "must be positive"));
        }

        Ok(())
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value.trim()).map_err(|e| ConfigError::invalid(name, e.to_string()))
}
