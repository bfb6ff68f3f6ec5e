//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

const REDACTED: &str = "<redacted>";

/// Dump the current configuration to stdout, with the client secret masked.
pub fn dump(config: &ClientConfig, path: Option<&Path>) -> ClientResult<()> {
    let toml_str = render(config)?;
    let path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(ClientConfig::default_path);
    println!("# config.toml ({})", path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Serializes the configuration for display.
pub fn render(config: &ClientConfig) -> ClientResult<String> {
    let mut shown = config.clone();
    if let Some(secret) = shown.google.client_secret.as_mut() {
        if !secret.starts_with("pass::") && !secret.starts_with("env::") {
            *secret = REDACTED.to_string();
        }
    }
    toml::to_string_pretty(&shown)
        .map_err(|e| ClientError::config(format!("failed to serialize config: {}", e)))
}

/// Validate the configuration.
pub fn validate(config: &ClientConfig, timezone: Option<&str>) -> ClientResult<()> {
    if config.google.calendar_ids.is_empty() {
        return Err(ClientError::config("google.calendar_ids must not be empty"));
    }
    config.zone(timezone)?;
    config.window()?;
    config.api_base_url()?;
    config.auth_config()?;
    println!("OAuth settings are complete.");

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration file path.
pub fn path(path: Option<&Path>) -> ClientResult<()> {
    let config_path = path
        .map(Path::to_path_buf)
        .unwrap_or_else(ClientConfig::default_path);
    println!("config: {}", config_path.display());
    Ok(())
}
