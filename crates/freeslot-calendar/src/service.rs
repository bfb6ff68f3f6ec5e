//! Availability over the user's calendars.
//!
//! Ties the credential broker, the calendar gateway and the availability
//! engine together: get a token, fetch busy time, compute free slots.

use std::sync::Arc;

use chrono_tz::Tz;
use tracing::{debug, info};

use freeslot_auth::CredentialBroker;
use freeslot_core::{AvailabilityEngine, BusyInterval, DailyFreeSlots, DaySpan, WorkingWindow};

use crate::client::CalendarGateway;
use crate::error::{CalendarError, CalendarResult};
use crate::event::{CreatedEvent, EventRequest};

/// Calendar queried when none is configured.
pub const PRIMARY_CALENDAR: &str = "primary";

/// Computes free time and books events for one user.
pub struct AvailabilityService {
    broker: Arc<CredentialBroker>,
    gateway: Arc<dyn CalendarGateway>,
    engine: AvailabilityEngine,
    zone: Tz,
    calendar_ids: Vec<String>,
}

impl AvailabilityService {
    /// Creates a service over the primary calendar with the default window.
    pub fn new(broker: Arc<CredentialBroker>, gateway: Arc<dyn CalendarGateway>, zone: Tz) -> Self {
        Self {
            broker,
            gateway,
            engine: AvailabilityEngine::default(),
            zone,
            calendar_ids: vec![PRIMARY_CALENDAR.to_string()],
        }
    }

    /// Sets the working window.
    pub fn with_window(mut self, window: WorkingWindow) -> Self {
        self.engine = AvailabilityEngine::new(window);
        self
    }

    /// Sets the calendars whose busy time is combined. Empty means primary.
    pub fn with_calendars(mut self, calendar_ids: Vec<String>) -> Self {
        self.calendar_ids = if calendar_ids.is_empty() {
            vec![PRIMARY_CALENDAR.to_string()]
        } else {
            calendar_ids
        };
        self
    }

    /// Returns the zone days are computed in.
    pub fn zone(&self) -> Tz {
        self.zone
    }

    /// Returns the calendars consulted.
    pub fn calendar_ids(&self) -> &[String] {
        &self.calendar_ids
    }

    /// Returns free slots for every day of `span`.
    pub async fn availability(&self, span: &DaySpan) -> CalendarResult<DailyFreeSlots> {
        let (time_min, time_max) = span.instants_in(&self.zone).ok_or_else(|| {
            CalendarError::invalid_response(format!(
                "no local midnight for {}..{} in {}",
                span.first(),
                span.last(),
                self.zone.name()
            ))
        })?;

        let token = self.broker.get_valid_credential().await?;
        let by_calendar = self
            .gateway
            .free_busy(
                &token,
                time_min,
                time_max,
                self.zone.name(),
                &self.calendar_ids,
            )
            .await?;

        let busy: Vec<BusyInterval> = by_calendar.into_values().flatten().collect();
        debug!(
            "{} busy interval(s) across {} calendar(s)",
            busy.len(),
            self.calendar_ids.len()
        );

        Ok(self.engine.compute_free_slots_in(&busy, span, &self.zone))
    }

    /// Validates and creates an event in the first configured calendar.
    pub async fn create_event(&self, request: &EventRequest) -> CalendarResult<CreatedEvent> {
        request.validate()?;
        let calendar_id = self
            .calendar_ids
            .first()
            .map(String::as_str)
            .unwrap_or(PRIMARY_CALENDAR);

        let token = self.broker.get_valid_credential().await?;
        let created = self
            .gateway
            .insert_event(&token, calendar_id, request)
            .await?;
        info!("created event {} in {}", created.id, calendar_id);
        Ok(created)
    }
}
