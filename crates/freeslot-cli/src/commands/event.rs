//! Event creation command.

use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use tracing::info;

use freeslot_calendar::{CreatedEvent, EventRequest};

use crate::config::ClientConfig;
use crate::error::ClientResult;

/// Fields of an event given on the command line.
#[derive(Debug, Clone)]
pub struct EventArgs {
    pub summary: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<String>,
    pub recurrence: Vec<String>,
}

impl EventArgs {
    /// Builds the API request, anchored to `zone`.
    pub fn into_request(self, zone: Tz) -> EventRequest {
        let mut request =
            EventRequest::new(self.summary, self.start, self.end).with_time_zone(zone.name());
        if let Some(description) = self.description {
            request = request.with_description(description);
        }
        if let Some(location) = self.location {
            request = request.with_location(location);
        }
        for email in self.attendees {
            request = request.with_attendee(email);
        }
        for rule in self.recurrence {
            request = request.with_recurrence(rule);
        }
        request
    }
}

/// Creates the event in the first configured calendar.
pub async fn run(config: &ClientConfig, zone: Tz, args: EventArgs) -> ClientResult<()> {
    let request = args.into_request(zone);
    request.validate()?;

    let service = super::service(config, zone)?;
    let created = service.create_event(&request).await?;
    info!("created event {}", created.id);
    println!("{}", render_created(&created));
    Ok(())
}

/// Renders the acknowledgement for humans.
pub fn render_created(created: &CreatedEvent) -> String {
    let mut out = format!("Event created: {}", created.id);
    if let Some(status) = &created.status {
        out.push_str(&format!(" ({})", status));
    }
    if let Some(link) = &created.html_link {
        out.push_str(&format!("\n{}", link));
    }
    out
}
