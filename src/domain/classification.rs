use crate::domain::models::{CalendarEvent, DismissalSet, NotificationState};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProximityWindows {
    /// Upcoming events starting within this lead are candidates at all.
    pub full_window: Duration,
    /// Upcoming events starting within this lead get an urgent mini notification.
    pub urgent_window: Duration,
}

impl Default for ProximityWindows {
    fn default() -> Self {
        Self {
            full_window: Duration::minutes(15),
            urgent_window: Duration::minutes(5),
        }
    }
}

/// Decides the next notification tier with the default 15/5 minute windows.
pub fn classify(
    events: &[CalendarEvent],
    dismissed: &DismissalSet,
    now: DateTime<Utc>,
    previous: &NotificationState,
) -> NotificationState {
    classify_with(&ProximityWindows::default(), events, dismissed, now, previous)
}

pub fn classify_with(
    windows: &ProximityWindows,
    events: &[CalendarEvent],
    dismissed: &DismissalSet,
    now: DateTime<Utc>,
    previous: &NotificationState,
) -> NotificationState {
    let mut candidates = events
        .iter()
        .filter(|event| event.validate().is_ok())
        .filter(|event| !dismissed.contains(&event.id))
        .collect::<Vec<_>>();
    // Stable: events sharing a start time keep source order.
    candidates.sort_by_key(|event| event.start_at);

    if let Some(current) = candidates.iter().find(|event| event.is_ongoing(now)) {
        return NotificationState::Mini {
            event: (*current).clone(),
            urgent: false,
        };
    }

    let Some(upcoming) = candidates
        .iter()
        .find(|event| now < event.start_at && event.start_at - now < windows.full_window)
    else {
        return NotificationState::None;
    };

    let lead = upcoming.start_at - now;
    if lead <= windows.urgent_window {
        return NotificationState::Mini {
            event: (*upcoming).clone(),
            urgent: true,
        };
    }

    match previous {
        NotificationState::None => NotificationState::Full {
            event: (*upcoming).clone(),
        },
        // An open full notification for the same event stays open; it is never replaced.
        NotificationState::Full { event } if event.id == upcoming.id => NotificationState::Full {
            event: (*upcoming).clone(),
        },
        _ => NotificationState::None,
    }
}
