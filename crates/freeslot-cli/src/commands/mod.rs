//! Subcommand implementations.

pub mod auth;
pub mod availability;
pub mod config;
pub mod event;
pub mod token;

use std::sync::Arc;

use chrono_tz::Tz;

use freeslot_auth::CredentialBroker;
use freeslot_calendar::{AvailabilityService, GoogleCalendarClient};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Builds a credential broker from the layered configuration.
pub(crate) fn broker(config: &ClientConfig) -> ClientResult<Arc<CredentialBroker>> {
    let auth = config.auth_config()?;
    Ok(Arc::new(CredentialBroker::new(auth)?))
}

/// Builds the availability service for `zone`.
pub(crate) fn service(config: &ClientConfig, zone: Tz) -> ClientResult<AvailabilityService> {
    let mut client = GoogleCalendarClient::new(config.request_timeout())?;
    if let Some(base_url) = config.api_base_url()? {
        client = client.with_base_url(&base_url);
    }

    Ok(AvailabilityService::new(broker(config)?, Arc::new(client), zone)
        .with_window(config.window()?)
        .with_calendars(config.google.calendar_ids.clone()))
}
