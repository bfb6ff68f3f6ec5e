//! Client configuration.
//!
//! Settings are layered, lowest precedence first:
//!
//! 1. built-in defaults
//! 2. `config.toml` (`~/.config/freeslot/config.toml` by default)
//! 3. a `.env` file in the working directory
//! 4. the process environment and command-line flags
//!
//! Credential values (`client_id`, `client_secret`) in `config.toml` support
//! secret references (`pass::…`, `env::…`, see [`crate::secret`]).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use freeslot_auth::AuthConfig;
use freeslot_auth::config::{
    ENV_AUTH_URL, ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_REDIRECT_URI, ENV_SCOPES, ENV_TOKEN_FILE,
    ENV_TOKEN_URL,
};
use freeslot_core::WorkingWindow;

use crate::error::{ClientError, ClientResult};

/// Zone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "America/Los_Angeles";

/// Configuration for the freeslot client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google OAuth and Calendar settings.
    pub google: GoogleSettings,

    /// Free-slot computation settings.
    pub availability: AvailabilitySettings,
}

/// Google OAuth and Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Loopback redirect URI registered with the OAuth client.
    pub redirect_uri: Option<String>,

    /// Authorization endpoint.
    pub auth_url: Option<String>,

    /// Token endpoint.
    pub token_url: Option<String>,

    /// Requested scopes; empty means the defaults.
    pub scopes: Vec<String>,

    /// Calendars whose busy time is combined. The first receives new events.
    pub calendar_ids: Vec<String>,

    /// Credential file location.
    pub token_path: Option<PathBuf>,

    /// Calendar API root, for proxies and tests.
    pub api_base_url: Option<String>,

    /// HTTP request timeout in seconds.
    pub request_timeout: u64,

    /// Seconds to wait for the browser authorization.
    pub grant_timeout: u64,
}

impl Default for GoogleSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            redirect_uri: None,
            auth_url: None,
            token_url: None,
            scopes: Vec::new(),
            calendar_ids: vec!["primary".to_string()],
            token_path: None,
            api_base_url: None,
            request_timeout: AuthConfig::DEFAULT_REQUEST_TIMEOUT.as_secs(),
            grant_timeout: AuthConfig::DEFAULT_GRANT_TIMEOUT.as_secs(),
        }
    }
}

/// Free-slot computation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AvailabilitySettings {
    /// IANA zone whose calendar days are reported.
    pub timezone: String,

    /// First schedulable hour.
    pub work_start_hour: u32,

    /// Hour at which the working day ends.
    pub work_end_hour: u32,
}

impl Default for AvailabilitySettings {
    fn default() -> Self {
        let window = WorkingWindow::default();
        Self {
            timezone: DEFAULT_TIMEZONE.to_string(),
            work_start_hour: window.start_hour(),
            work_end_hour: window.end_hour(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from `path`, or from the default path.
    ///
    /// An explicitly named file must exist; a missing default file yields
    /// the built-in defaults.
    pub fn load(path: Option<&Path>) -> ClientResult<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Self::default_path();
                if path.exists() {
                    Self::load_from(&path)
                } else {
                    debug!("no config file at {}", path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse(&content)
            .map_err(|e| ClientError::config(format!("{}: {}", path.display(), e)))
    }

    /// Parses configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("freeslot")
    }

    /// Builds the OAuth configuration from the process environment and the file.
    pub fn auth_config(&self) -> ClientResult<AuthConfig> {
        self.auth_config_with(|name| std::env::var(name).ok())
    }

    /// Builds the OAuth configuration from `lookup` and the file.
    ///
    /// A non-blank variable wins over the file value. File values pass
    /// through secret resolution.
    pub fn auth_config_with<F>(&self, lookup: F) -> ClientResult<AuthConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        let google = &self.google;
        let mut merged: HashMap<&'static str, String> = HashMap::new();

        let file_values = [
            (ENV_CLIENT_ID, google.client_id.as_deref(), true),
            (ENV_CLIENT_SECRET, google.client_secret.as_deref(), true),
            (ENV_REDIRECT_URI, google.redirect_uri.as_deref(), false),
            (ENV_AUTH_URL, google.auth_url.as_deref(), false),
            (ENV_TOKEN_URL, google.token_url.as_deref(), false),
        ];
        for (name, file_value, secret) in file_values {
            if let Some(value) = non_blank(lookup(name)) {
                merged.insert(name, value);
            } else if let Some(value) = file_value.filter(|v| !v.trim().is_empty()) {
                let value = if secret {
                    crate::secret::resolve(value).map_err(|e| {
                        ClientError::config(format!("failed to resolve {}: {}", name, e))
                    })?
                } else {
                    value.to_string()
                };
                merged.insert(name, value);
            }
        }

        let token_file = non_blank(lookup(ENV_TOKEN_FILE))
            .or_else(|| google.token_path.as_ref().map(|p| p.display().to_string()));
        if let Some(path) = token_file {
            merged.insert(ENV_TOKEN_FILE, path);
        }

        let scopes = non_blank(lookup(ENV_SCOPES))
            .or_else(|| (!google.scopes.is_empty()).then(|| google.scopes.join(" ")));
        if let Some(scopes) = scopes {
            merged.insert(ENV_SCOPES, scopes);
        }

        let config = AuthConfig::from_lookup(|name| merged.get(name).cloned())?
            .with_request_timeout(Duration::from_secs(google.request_timeout))
            .with_grant_timeout(Duration::from_secs(google.grant_timeout));
        config.validate()?;
        Ok(config)
    }

    /// Resolves the reporting zone; `cli_override` wins over the file.
    pub fn zone(&self, cli_override: Option<&str>) -> ClientResult<Tz> {
        let name = cli_override.unwrap_or(&self.availability.timezone);
        name.parse::<Tz>()
            .map_err(|e| ClientError::config(format!("unknown timezone '{}': {}", name, e)))
    }

    /// Returns the configured working window.
    pub fn window(&self) -> ClientResult<WorkingWindow> {
        Ok(WorkingWindow::new(
            self.availability.work_start_hour,
            self.availability.work_end_hour,
        )?)
    }

    /// Returns the calendar API root override, if any.
    pub fn api_base_url(&self) -> ClientResult<Option<Url>> {
        self.google
            .api_base_url
            .as_deref()
            .map(|raw| {
                Url::parse(raw).map_err(|e| {
                    ClientError::config(format!("invalid api_base_url '{}': {}", raw, e))
                })
            })
            .transpose()
    }

    /// Returns the HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.google.request_timeout)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
