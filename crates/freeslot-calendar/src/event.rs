//! Calendar event creation requests.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, CalendarResult};

/// Prefixes accepted on recurrence lines (RFC 5545).
const RECURRENCE_PREFIXES: [&str; 4] = ["RRULE:", "EXRULE:", "RDATE", "EXDATE"];

/// Start or end of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    /// The instant, with its UTC offset.
    pub date_time: DateTime<FixedOffset>,
    /// IANA zone the event is anchored to (needed for recurring events).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

/// An invited attendee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Attendee email address.
    pub email: String,
}

/// A request to create a calendar event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRequest {
    /// Event title.
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<Attendee>,
    /// RRULE/EXRULE/RDATE/EXDATE lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recurrence: Vec<String>,
}

impl EventRequest {
    /// Creates a request for a single event.
    pub fn new(
        summary: impl Into<String>,
        start: DateTime<FixedOffset>,
        end: DateTime<FixedOffset>,
    ) -> Self {
        Self {
            summary: summary.into(),
            start: EventTime {
                date_time: start,
                time_zone: None,
            },
            end: EventTime {
                date_time: end,
                time_zone: None,
            },
            description: None,
            location: None,
            attendees: Vec::new(),
            recurrence: Vec::new(),
        }
    }

    /// Anchors both ends to an IANA zone.
    pub fn with_time_zone(mut self, zone: impl Into<String>) -> Self {
        let zone = zone.into();
        self.start.time_zone = Some(zone.clone());
        self.end.time_zone = Some(zone);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_attendee(mut self, email: impl Into<String>) -> Self {
        self.attendees.push(Attendee {
            email: email.into(),
        });
        self
    }

    pub fn with_recurrence(mut self, rule: impl Into<String>) -> Self {
        self.recurrence.push(rule.into());
        self
    }

    /// Checks the request before it is sent.
    pub fn validate(&self) -> CalendarResult<()> {
        if self.summary.trim().is_empty() {
            return Err(CalendarError::invalid_event("summary is empty"));
        }
        if self.end.date_time <= self.start.date_time {
            return Err(CalendarError::invalid_event(format!(
                "end {} is not after start {}",
                self.end.date_time.to_rfc3339(),
                self.start.date_time.to_rfc3339()
            )));
        }
        if let Some(attendee) = self.attendees.iter().find(|a| !a.email.contains('@')) {
            return Err(CalendarError::invalid_event(format!(
                "attendee '{}' is not an email address",
                attendee.email
            )));
        }
        if let Some(rule) = self
            .recurrence
            .iter()
            .find(|r| !RECURRENCE_PREFIXES.iter().any(|p| r.starts_with(p)))
        {
            return Err(CalendarError::invalid_event(format!(
                "recurrence '{}' must start with RRULE:, EXRULE:, RDATE or EXDATE",
                rule
            )));
        }
        if !self.recurrence.is_empty() && self.start.time_zone.is_none() {
            return Err(CalendarError::invalid_event(
                "recurring events need a time zone",
            ));
        }
        Ok(())
    }
}

/// The created event, as acknowledged by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedEvent {
    pub id: String,
    /// Link to the event in the calendar web UI.
    #[serde(default)]
    pub html_link: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}
