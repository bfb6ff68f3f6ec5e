//! Google Calendar API client.
//!
//! Low-level HTTP calls for free/busy queries and event creation. The bearer
//! token is passed per call; obtaining it is the credential broker's job.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use freeslot_auth::BoxFuture;
use freeslot_core::BusyInterval;

use crate::error::{CalendarError, CalendarResult};
use crate::event::{CreatedEvent, EventRequest};

/// Base URL for Google Calendar API v3.
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Busy intervals per calendar id.
pub type BusyByCalendar = BTreeMap<String, Vec<BusyInterval>>;

/// Remote calendar operations the availability service relies on.
pub trait CalendarGateway: Send + Sync {
    /// Queries busy time between `time_min` and `time_max` for each calendar.
    fn free_busy<'a>(
        &'a self,
        token: &'a str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        time_zone: &'a str,
        calendar_ids: &'a [String],
    ) -> BoxFuture<'a, CalendarResult<BusyByCalendar>>;

    /// Creates an event in `calendar_id`.
    fn insert_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event: &'a EventRequest,
    ) -> BoxFuture<'a, CalendarResult<CreatedEvent>>;
}

/// Google Calendar API client.
#[derive(Debug)]
pub struct GoogleCalendarClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl GoogleCalendarClient {
    /// Creates a client for the public Google Calendar API.
    pub fn new(timeout: Duration) -> CalendarResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(format!("freeslot/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(CalendarError::network)?;

        Ok(Self {
            http_client,
            base_url: CALENDAR_API_BASE.to_string(),
        })
    }

    /// Points the client at another API root.
    pub fn with_base_url(mut self, base_url: &Url) -> Self {
        self.base_url = base_url.as_str().trim_end_matches('/').to_string();
        self
    }

    /// Returns the API root in use.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn query_free_busy(
        &self,
        token: &str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        time_zone: &str,
        calendar_ids: &[String],
    ) -> CalendarResult<BusyByCalendar> {
        let url = format!("{}/freeBusy", self.base_url);
        let body = FreeBusyRequest {
            time_min: time_min.to_rfc3339(),
            time_max: time_max.to_rfc3339(),
            time_zone,
            items: calendar_ids.iter().map(|id| CalendarItem { id }).collect(),
        };
        debug!(
            "querying free/busy for {} calendar(s) from {} to {}",
            calendar_ids.len(),
            body.time_min,
            body.time_max
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(CalendarError::network)?;

        let body = check_response(response).await?;
        let parsed: FreeBusyResponse = serde_json::from_str(&body).map_err(|e| {
            CalendarError::invalid_response(format!("failed to parse response: {}", e))
        })?;

        convert_free_busy(parsed, calendar_ids)
    }

    async fn create_event(
        &self,
        token: &str,
        calendar_id: &str,
        event: &EventRequest,
    ) -> CalendarResult<CreatedEvent> {
        event.validate()?;

        let url = format!(
            "{}/calendars/{}/events",
            self.base_url,
            urlencoding::encode(calendar_id)
        );
        debug!("creating event '{}' in {}", event.summary, calendar_id);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await
            .map_err(CalendarError::network)?;

        let body = check_response(response).await?;
        serde_json::from_str(&body)
            .map_err(|e| CalendarError::invalid_response(format!("failed to parse event: {}", e)))
    }
}

impl CalendarGateway for GoogleCalendarClient {
    fn free_busy<'a>(
        &'a self,
        token: &'a str,
        time_min: DateTime<FixedOffset>,
        time_max: DateTime<FixedOffset>,
        time_zone: &'a str,
        calendar_ids: &'a [String],
    ) -> BoxFuture<'a, CalendarResult<BusyByCalendar>> {
        Box::pin(self.query_free_busy(token, time_min, time_max, time_zone, calendar_ids))
    }

    fn insert_event<'a>(
        &'a self,
        token: &'a str,
        calendar_id: &'a str,
        event: &'a EventRequest,
    ) -> BoxFuture<'a, CalendarResult<CreatedEvent>> {
        Box::pin(self.create_event(token, calendar_id, event))
    }
}

/// Maps error statuses and returns the body of a successful response.
async fn check_response(response: reqwest::Response) -> CalendarResult<String> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok());
        return Err(CalendarError::RateLimited { retry_after });
    }

    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(CalendarError::Authentication);
    }

    if status == reqwest::StatusCode::FORBIDDEN {
        let body = response.text().await.unwrap_or_default();
        return Err(CalendarError::Authorization { body });
    }

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(CalendarError::Server {
            status: status.as_u16(),
            body,
        });
    }

    response
        .text()
        .await
        .map_err(|e| CalendarError::invalid_response(format!("failed to read response: {}", e)))
}

fn convert_free_busy(
    response: FreeBusyResponse,
    calendar_ids: &[String],
) -> CalendarResult<BusyByCalendar> {
    let mut calendars = response.calendars;
    let mut result = BusyByCalendar::new();

    for id in calendar_ids {
        let Some(entry) = calendars.remove(id) else {
            warn!("free/busy response has no entry for calendar {}", id);
            result.insert(id.clone(), Vec::new());
            continue;
        };

        if let Some(error) = entry.errors.first() {
            return Err(CalendarError::Calendar {
                calendar_id: id.clone(),
                reason: error.reason.clone(),
            });
        }

        let busy = entry
            .busy
            .iter()
            .map(|period| BusyInterval::parse(&period.start, &period.end))
            .collect::<Result<Vec<_>, _>>()?;
        result.insert(id.clone(), busy);
    }

    Ok(result)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    time_zone: &'a str,
    items: Vec<CalendarItem<'a>>,
}

#[derive(Debug, Serialize)]
struct CalendarItem<'a> {
    id: &'a str,
}

#[derive(Debug, Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: BTreeMap<String, FreeBusyCalendar>,
}

#[derive(Debug, Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyPeriod>,
    #[serde(default)]
    errors: Vec<FreeBusyError>,
}

#[derive(Debug, Deserialize)]
struct BusyPeriod {
    start: String,
    end: String,
}

#[derive(Debug, Deserialize)]
struct FreeBusyError {
    #[serde(default)]
    reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn at(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    async fn client(server: &MockServer) -> GoogleCalendarClient {
        GoogleCalendarClient::new(Duration::from_secs(5))
            .unwrap()
            .with_base_url(&Url::parse(&server.uri()).unwrap())
    }

    fn primary() -> Vec<String> {
        vec!["primary".to_string()]
    }

    #[test]
    fn parse_free_busy_response() {
        let json = r#"{
            "kind": "calendar#freeBusy",
            "timeMin": "2025-04-28T07:00:00.000Z",
            "timeMax": "2025-04-29T07:00:00.000Z",
            "calendars": {
                "primary": {
                    "busy": [
                        {"start": "2025-04-28T09:00:00-07:00", "end": "2025-04-28T10:00:00-07:00"},
                        {"start": "2025-04-28T18:30:00Z", "end": "2025-04-28T19:00:00Z"}
                    ]
                }
            }
        }"#;
        let response: FreeBusyResponse = serde_json::from_str(json).unwrap();
        let busy = convert_free_busy(response, &primary()).unwrap();
        assert_eq!(busy["primary"].len(), 2);
        assert_eq!(busy["primary"][0].start, at("2025-04-28T09:00:00-07:00"));
        assert_eq!(busy["primary"][1].end.offset().local_minus_utc(), 0);
    }

    #[test]
    fn calendar_error_is_reported() {
        let json = r#"{"calendars": {"team@example.com": {"errors": [{"domain": "global", "reason": "notFound"}], "busy": []}}}"#;
        let response: FreeBusyResponse = serde_json::from_str(json).unwrap();
        let err = convert_free_busy(response, &["team@example.com".to_string()]).unwrap_err();
        match err {
            CalendarError::Calendar {
                calendar_id,
                reason,
            } => {
                assert_eq!(calendar_id, "team@example.com");
                assert_eq!(reason, "notFound");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_calendar_is_empty() {
        let response: FreeBusyResponse = serde_json::from_str(r#"{"calendars": {}}"#).unwrap();
        let busy = convert_free_busy(response, &primary()).unwrap();
        assert!(busy["primary"].is_empty());
    }

    #[test]
    fn bad_instant_is_invalid() {
        let json = r#"{"calendars": {"primary": {"busy": [{"start": "yesterday", "end": "today"}]}}}"#;
        let response: FreeBusyResponse = serde_json::from_str(json).unwrap();
        let err = convert_free_busy(response, &primary()).unwrap_err();
        assert!(matches!(err, CalendarError::Window(_)));
    }

    #[tokio::test]
    async fn free_busy_sends_query_with_bearer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/freeBusy"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "timeMin": "2025-04-28T00:00:00-07:00",
                "timeMax": "2025-04-29T00:00:00-07:00",
                "timeZone": "America/Los_Angeles",
                "items": [{"id": "primary"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "calendars": {"primary": {"busy": [
                    {"start": "2025-04-28T09:00:00-07:00", "end": "2025-04-28T10:00:00-07:00"}
                ]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let busy = client(&server)
            .await
            .free_busy(
                "tok",
                at("2025-04-28T00:00:00-07:00"),
                at("2025-04-29T00:00:00-07:00"),
                "America/Los_Angeles",
                &primary(),
            )
            .await
            .unwrap();
        assert_eq!(busy["primary"].len(), 1);
    }

    #[tokio::test]
    async fn status_codes_are_mapped() {
        let cases = [
            (401, "unauthorized"),
            (403, "forbidden"),
            (429, "rate"),
            (500, "server"),
        ];
        for (status, label) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(status)
                        .insert_header("Retry-After", "12")
                        .set_body_string("nope"),
                )
                .mount(&server)
                .await;

            let err = client(&server)
                .await
                .free_busy(
                    "tok",
                    at("2025-04-28T00:00:00Z"),
                    at("2025-04-29T00:00:00Z"),
                    "UTC",
                    &primary(),
                )
                .await
                .unwrap_err();

            match (status, err) {
                (401, CalendarError::Authentication) => {}
                (403, CalendarError::Authorization { body }) => assert_eq!(body, "nope"),
                (429, CalendarError::RateLimited { retry_after }) => {
                    assert_eq!(retry_after, Some(12))
                }
                (500, CalendarError::Server { status, body }) => {
                    assert_eq!(status, 500);
                    assert_eq!(body, "nope");
                }
                (_, other) => panic!("{label}: unexpected error {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn insert_event_posts_to_calendar() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/calendars/team%40example.com/events"))
            .and(header("authorization", "Bearer tok"))
            .and(body_partial_json(serde_json::json!({
                "summary": "Walk",
                "start": {"dateTime": "2025-04-28T12:00:00-07:00"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "evt1",
                "htmlLink": "https://calendar.google.com/event?eid=evt1",
                "status": "confirmed"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = EventRequest::new(
            "Walk",
            at("2025-04-28T12:00:00-07:00"),
            at("2025-04-28T12:30:00-07:00"),
        );
        let created = client(&server)
            .await
            .insert_event("tok", "team@example.com", &request)
            .await
            .unwrap();
        assert_eq!(created.id, "evt1");
        assert_eq!(created.status.as_deref(), Some("confirmed"));
    }

    #[tokio::test]
    async fn invalid_event_is_not_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let request = EventRequest::new(
            "",
            at("2025-04-28T12:00:00-07:00"),
            at("2025-04-28T12:30:00-07:00"),
        );
        let err = client(&server)
            .await
            .insert_event("tok", "primary", &request)
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::InvalidEvent { .. }));
    }
}
