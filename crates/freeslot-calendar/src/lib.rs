//! Calendar access and the availability service.
//!
//! - [`GoogleCalendarClient`] - free/busy queries and event creation over
//!   the Google Calendar v3 REST API
//! - [`CalendarGateway`] - the seam the service talks through
//! - [`AvailabilityService`] - token, busy time and free-slot computation
//!   in one call

pub mod client;
pub mod error;
pub mod event;
pub mod service;

pub use client::{BusyByCalendar, CALENDAR_API_BASE, CalendarGateway, GoogleCalendarClient};
pub use error::{CalendarError, CalendarResult};
pub use event::{Attendee, CreatedEvent, EventRequest, EventTime};
pub use service::{AvailabilityService, PRIMARY_CALENDAR};
