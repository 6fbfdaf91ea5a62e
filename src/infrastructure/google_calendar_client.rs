use crate::domain::models::CalendarEvent;
use crate::infrastructure::calendar_port::CalendarPort;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::event_mapper::{decode_calendar_events, GoogleCalendarEvent};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use std::time::Duration;
use url::Url;

const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Read-only Google Calendar adapter. Expands recurring events and asks the API
/// to order by start time.
#[derive(Debug, Clone)]
pub struct ReqwestGoogleCalendarClient {
    client: Client,
    access_token: String,
    calendar_id: String,
    max_results: u32,
}

impl ReqwestGoogleCalendarClient {
    pub fn new(
        access_token: impl Into<String>,
        calendar_id: impl Into<String>,
        max_results: u32,
    ) -> Result<Self, InfraError> {
        let access_token = access_token.into();
        let calendar_id = calendar_id.into();
        Self::ensure_non_empty(&access_token, "access token")?;
        Self::ensure_non_empty(&calendar_id, "calendar id")?;
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|error| InfraError::InvalidConfig(format!("failed to build http client: {error}")))?;
        Ok(Self {
            client,
            access_token,
            calendar_id,
            max_results: max_results.max(1),
        })
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::InvalidConfig(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("google calendar api error: http {}", status.as_u16())
        } else {
            format!("google calendar api error: http {}; body={body}", status.as_u16())
        };
        InfraError::UpstreamFetchFailed(message)
    }

    fn events_endpoint(calendar_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(CALENDAR_API_BASE)
            .map_err(|error| InfraError::InvalidUrl(format!("invalid calendar api base url: {error}")))?;
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidUrl("calendar api base URL cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.push("calendars");
            segments.push(calendar_id);
            segments.push("events");
        }
        Ok(url)
    }

    fn list_query(&self, time_min: DateTime<Utc>, time_max: DateTime<Utc>) -> Vec<(&'static str, String)> {
        vec![
            ("timeMin", time_min.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("timeMax", time_max.to_rfc3339_opts(SecondsFormat::Secs, true)),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
            ("maxResults", self.max_results.to_string()),
        ]
    }
}

#[derive(Debug, serde::Deserialize)]
struct EventsPageResponse {
    items: Option<Vec<GoogleCalendarEvent>>,
}

#[async_trait]
impl CalendarPort for ReqwestGoogleCalendarClient {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        let endpoint = Self::events_endpoint(&self.calendar_id)?;
        let response = self
            .client
            .get(endpoint)
            .bearer_auth(&self.access_token)
            .query(&self.list_query(time_min, time_max))
            .send()
            .await
            .map_err(|error| {
                InfraError::UpstreamFetchFailed(format!(
                    "network error while listing calendar events: {error}"
                ))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|error| {
            InfraError::UpstreamFetchFailed(format!("failed reading events list response: {error}"))
        })?;

        if !status.is_success() {
            return Err(Self::http_error(status, &body));
        }

        let parsed: EventsPageResponse = serde_json::from_str(&body).map_err(|error| {
            InfraError::UpstreamFetchFailed(format!("invalid events list payload: {error}"))
        })?;

        Ok(decode_calendar_events(&parsed.items.unwrap_or_default()))
    }
}
