use crate::domain::models::CalendarEvent;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Source of calendar events. No ordering guarantee on the returned list.
#[async_trait]
pub trait CalendarPort: Send + Sync {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError>;
}

/// Stand-in used while no calendar account is connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredCalendarPort;

#[async_trait]
impl CalendarPort for UnconfiguredCalendarPort {
    async fn list_events(
        &self,
        _time_min: DateTime<Utc>,
        _time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        Err(InfraError::UpstreamFetchFailed(
            "calendar not connected".to_string(),
        ))
    }
}

/// Serves a fixed, replaceable event list; overlapping the fetch window is the only filter.
#[derive(Debug, Default)]
pub struct InMemoryCalendarPort {
    events: Mutex<Vec<CalendarEvent>>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl InMemoryCalendarPort {
    pub fn with_events(events: Vec<CalendarEvent>) -> Self {
        Self {
            events: Mutex::new(events),
            ..Self::default()
        }
    }

    pub fn replace_events(&self, events: Vec<CalendarEvent>) -> Result<(), InfraError> {
        let mut guard = self
            .events
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("calendar port lock poisoned: {error}")))?;
        *guard = events;
        Ok(())
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarPort for InMemoryCalendarPort {
    async fn list_events(
        &self,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, InfraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(InfraError::UpstreamFetchFailed(
                "network error while listing calendar events".to_string(),
            ));
        }
        let events = self
            .events
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("calendar port lock poisoned: {error}")))?;
        Ok(events
            .iter()
            .filter(|event| event.end_at > time_min && event.start_at < time_max)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(id: &str, start_offset_hours: i64) -> CalendarEvent {
        let start_at = fixed_time() + Duration::hours(start_offset_hours);
        CalendarEvent {
            id: id.to_string(),
            summary: id.to_string(),
            location: None,
            start_at,
            end_at: start_at + Duration::hours(1),
            all_day: false,
        }
    }

    #[tokio::test]
    async fn in_memory_port_filters_by_window_and_counts_calls() {
        let port = InMemoryCalendarPort::with_events(vec![
            event("past", -3),
            event("ongoing", 0),
            event("tomorrow", 30),
        ]);

        let listed = port
            .list_events(fixed_time() + Duration::minutes(30), fixed_time() + Duration::hours(24))
            .await
            .expect("list events");
        let ids = listed.iter().map(|event| event.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["ongoing"]);
        assert_eq!(port.call_count(), 1);
    }

    #[tokio::test]
    async fn failing_ports_report_upstream_errors() {
        let port = InMemoryCalendarPort::default();
        port.set_failing(true);
        let result = port.list_events(fixed_time(), fixed_time()).await;
        assert!(matches!(result, Err(InfraError::UpstreamFetchFailed(_))));

        let unconfigured = UnconfiguredCalendarPort;
        let result = unconfigured.list_events(fixed_time(), fixed_time()).await;
        assert!(matches!(result, Err(InfraError::UpstreamFetchFailed(_))));
    }
}
