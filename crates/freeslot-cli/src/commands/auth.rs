//! Authorization commands.

use chrono::{DateTime, Utc};
use tracing::info;

use freeslot_auth::CredentialStatus;

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Runs the browser authorization flow.
///
/// Does nothing when a usable credential is stored, unless `force` is set.
pub async fn authorize(config: &ClientConfig, force: bool) -> ClientResult<()> {
    let broker = super::broker(config)?;

    if !force {
        match broker.status() {
            Ok(CredentialStatus::Valid { .. })
            | Ok(CredentialStatus::Expired {
                has_refresh_token: true,
                ..
            }) => {
                println!("Already authorized with Google Calendar.");
                println!("Use --force to re-authorize.");
                return Ok(());
            }
            Ok(_) => {}
            Err(e) => info!("stored credential unusable, re-authorizing: {}", e),
        }
    } else {
        broker.store().clear()?;
    }

    println!("Starting Google Calendar authorization...");
    println!();
    println!("A browser window will open for you to grant access.");
    println!("If the browser doesn't open, check the terminal for a URL to copy.");
    println!();

    let credential = broker.authorize().await?;

    info!("authorization successful");
    println!("Authorization successful!");
    println!("Credential saved to {}", broker.store().path().display());
    if credential.refresh_token().is_none() {
        println!("Note: no refresh token was issued; re-authorize when it expires.");
    }
    Ok(())
}

/// Prints the stored credential's freshness.
pub fn status(config: &ClientConfig) -> ClientResult<()> {
    let broker = super::broker(config)?;
    let path = broker.store().path().display().to_string();
    let text = match broker.status() {
        Ok(status) => render_status(&status, Utc::now()),
        Err(e) => format!("Credential file is unreadable: {}", e),
    };
    println!("{}", text);
    println!("File: {}", path);
    Ok(())
}

/// Renders a credential status for humans.
pub fn render_status(status: &CredentialStatus, now: DateTime<Utc>) -> String {
    let refresh = |has: bool| {
        if has {
            "refresh token stored"
        } else {
            "no refresh token"
        }
    };

    match status {
        CredentialStatus::Missing => {
            "Not authorized. Run `freeslot auth` to grant access.".to_string()
        }
        CredentialStatus::Valid {
            expires_at,
            has_refresh_token,
        } => format!(
            "Authorized: access token valid for {} more minute(s) ({})",
            (*expires_at - now).num_minutes().max(0),
            refresh(*has_refresh_token)
        ),
        CredentialStatus::Expired {
            expires_at,
            has_refresh_token: true,
        } => format!(
            "Access token expired at {}; it will be refreshed on next use",
            expires_at.to_rfc3339()
        ),
        CredentialStatus::Expired {
            expires_at,
            has_refresh_token: false,
        } => format!(
            "Access token expired at {} ({}); run `freeslot auth --force`",
            expires_at.to_rfc3339(),
            refresh(false)
        ),
    }
}
