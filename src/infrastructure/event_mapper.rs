use crate::domain::models::CalendarEvent;
use crate::infrastructure::error::InfraError;
use chrono::{DateTime, NaiveDate, Utc};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq, Default)]
pub struct CalendarEventDateTime {
    #[serde(rename = "dateTime", default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct GoogleCalendarEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(rename = "htmlLink", skip_serializing_if = "Option::is_none")]
    pub html_link: Option<String>,
    #[serde(default)]
    pub start: CalendarEventDateTime,
    #[serde(default)]
    pub end: CalendarEventDateTime,
}

/// Maps a wire event to the monitor's view. Cancelled and id-less events map to `None`.
pub fn decode_calendar_event(event: &GoogleCalendarEvent) -> Result<Option<CalendarEvent>, InfraError> {
    let is_cancelled = event
        .status
        .as_deref()
        .is_some_and(|status| status.eq_ignore_ascii_case("cancelled"));
    if is_cancelled {
        return Ok(None);
    }

    let Some(id) = event
        .id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
    else {
        return Ok(None);
    };

    let (start_at, start_all_day) = parse_event_time(&event.start, "start")?;
    let (end_at, end_all_day) = parse_event_time(&event.end, "end")?;
    if end_at < start_at {
        return Err(InfraError::UpstreamFetchFailed(format!(
            "invalid calendar event {id}: end is before start"
        )));
    }

    Ok(Some(CalendarEvent {
        id,
        summary: event
            .summary
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("(No title)")
            .to_string(),
        location: event
            .location
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned),
        start_at,
        end_at,
        all_day: start_all_day && end_all_day,
    }))
}

/// Decodes a page of events, dropping entries that cannot be interpreted.
pub fn decode_calendar_events(events: &[GoogleCalendarEvent]) -> Vec<CalendarEvent> {
    events
        .iter()
        .filter_map(|event| match decode_calendar_event(event) {
            Ok(decoded) => decoded,
            Err(error) => {
                log::warn!("skipping calendar event: {error}");
                None
            }
        })
        .collect()
}

fn parse_event_time(
    value: &CalendarEventDateTime,
    field_name: &str,
) -> Result<(DateTime<Utc>, bool), InfraError> {
    if let Some(date_time) = value.date_time.as_deref() {
        let parsed = DateTime::parse_from_rfc3339(date_time).map_err(|error| {
            InfraError::UpstreamFetchFailed(format!(
                "invalid calendar event {field_name}.dateTime '{date_time}': {error}"
            ))
        })?;
        return Ok((parsed.with_timezone(&Utc), false));
    }

    if let Some(date) = value.date.as_deref() {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|error| {
            InfraError::UpstreamFetchFailed(format!(
                "invalid calendar event {field_name}.date '{date}': {error}"
            ))
        })?;
        let midnight = parsed.and_hms_opt(0, 0, 0).ok_or_else(|| {
            InfraError::UpstreamFetchFailed(format!("calendar event {field_name}.date '{date}' has no midnight"))
        })?;
        return Ok((midnight.and_utc(), true));
    }

    Err(InfraError::UpstreamFetchFailed(format!(
        "calendar event {field_name} has neither dateTime nor date"
    )))
}
