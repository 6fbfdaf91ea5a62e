use crate::domain::models::{CalendarEvent, NotificationState};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimings {
    pub auto_hide: Duration,
    pub full_end_grace: Duration,
    pub mini_end_grace: Duration,
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            auto_hide: Duration::seconds(30),
            full_end_grace: Duration::seconds(5),
            mini_end_grace: Duration::seconds(10),
        }
    }
}

/// The displayed tier plus the timers that can retire it between classifications.
#[derive(Debug, Clone)]
pub struct NotificationLifecycle {
    timings: LifecycleTimings,
    state: NotificationState,
    auto_hide_at: Option<DateTime<Utc>>,
    hovered: bool,
}

impl NotificationLifecycle {
    pub fn new(timings: LifecycleTimings) -> Self {
        Self {
            timings,
            state: NotificationState::None,
            auto_hide_at: None,
            hovered: false,
        }
    }

    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    pub fn auto_hide_at(&self) -> Option<DateTime<Utc>> {
        self.auto_hide_at
    }

    /// Applies a freshly classified tier. Returns `true` when the presented
    /// notification changed (tier, urgency or event).
    pub fn transition(&mut self, next: NotificationState, now: DateTime<Utc>) -> bool {
        if same_presentation(&self.state, &next) {
            self.state = next;
            return false;
        }

        self.hovered = false;
        self.auto_hide_at = match &next {
            NotificationState::Full { .. } => Some(now + self.timings.auto_hide),
            _ => None,
        };
        self.state = next;
        true
    }

    pub fn clear(&mut self, now: DateTime<Utc>) -> bool {
        self.transition(NotificationState::None, now)
    }

    pub fn pointer_entered(&mut self) {
        if self.state.is_full() {
            self.hovered = true;
            self.auto_hide_at = None;
        }
    }

    pub fn pointer_left(&mut self, now: DateTime<Utc>) {
        if self.state.is_full() && self.hovered {
            self.hovered = false;
            self.auto_hide_at = Some(now + self.timings.auto_hide);
        }
    }

    /// Retires the notification when its timers have run out. Returns `true`
    /// when the state changed.
    pub fn tick(&mut self, now: DateTime<Utc>) -> bool {
        let Some(event) = self.state.event() else {
            return false;
        };

        let grace = if self.state.is_full() {
            self.timings.full_end_grace
        } else {
            self.timings.mini_end_grace
        };
        let ended_past_grace = event.has_ended(now) && now >= event.end_at + grace;
        let auto_hidden = self
            .auto_hide_at
            .is_some_and(|deadline| !self.hovered && now >= deadline);

        if ended_past_grace || auto_hidden {
            return self.transition(NotificationState::None, now);
        }
        false
    }
}

fn same_presentation(current: &NotificationState, next: &NotificationState) -> bool {
    match (current, next) {
        (NotificationState::None, NotificationState::None) => true,
        (NotificationState::Full { event: a }, NotificationState::Full { event: b }) => a.id == b.id,
        (
            NotificationState::Mini {
                event: a,
                urgent: urgent_a,
            },
            NotificationState::Mini {
                event: b,
                urgent: urgent_b,
            },
        ) => a.id == b.id && urgent_a == urgent_b,
        _ => false,
    }
}

/// `"1h 5m"`, `"4m 30s"` or `"12s"`.
pub fn format_countdown(remaining: Duration) -> String {
    let total_seconds = remaining.num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

pub fn countdown_label(event: &CalendarEvent, now: DateTime<Utc>) -> String {
    if now < event.start_at {
        format!("Starts in {}", format_countdown(event.start_at - now))
    } else if now < event.end_at {
        format!("Ends in {}", format_countdown(event.end_at - now))
    } else {
        "Event ended".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(id: &str, start_offset_min: i64, duration_min: i64) -> CalendarEvent {
        let start_at = base_time() + Duration::minutes(start_offset_min);
        CalendarEvent {
            id: id.to_string(),
            summary: "Design review".to_string(),
            location: Some("Room 4".to_string()),
            start_at,
            end_at: start_at + Duration::minutes(duration_min),
            all_day: false,
        }
    }

    fn full(id: &str) -> NotificationState {
        NotificationState::Full {
            event: event(id, 10, 30),
        }
    }

    #[test]
    fn full_auto_hides_after_thirty_seconds() {
        let mut lifecycle = NotificationLifecycle::new(LifecycleTimings::default());
        assert!(lifecycle.transition(full("e1"), base_time()));

        assert!(!lifecycle.tick(base_time() + Duration::seconds(29)));
        assert!(lifecycle.state().is_full());
        assert!(lifecycle.tick(base_time() + Duration::seconds(30)));
        assert!(lifecycle.state().is_none());
    }

    #[test]
    fn hovering_suspends_and_leaving_restarts_auto_hide() {
        let mut lifecycle = NotificationLifecycle::new(LifecycleTimings::default());
        lifecycle.transition(full("e1"), base_time());

        lifecycle.pointer_entered();
        assert!(!lifecycle.tick(base_time() + Duration::seconds(120)));
        assert!(lifecycle.state().is_full());

        let left_at = base_time() + Duration::seconds(120);
        lifecycle.pointer_left(left_at);
        assert!(!lifecycle.tick(left_at + Duration::seconds(29)));
        assert!(lifecycle.tick(left_at + Duration::seconds(30)));
    }

    #[test]
    fn reclassifying_the_same_full_keeps_the_timer() {
        let mut lifecycle = NotificationLifecycle::new(LifecycleTimings::default());
        lifecycle.transition(full("e1"), base_time());
        assert!(!lifecycle.transition(full("e1"), base_time() + Duration::seconds(20)));
        assert_eq!(
            lifecycle.auto_hide_at(),
            Some(base_time() + Duration::seconds(30))
        );
    }

    #[test]
    fn ended_mini_clears_after_ten_second_grace() {
        let mut lifecycle = NotificationLifecycle::new(LifecycleTimings::default());
        let ongoing = event("e1", -30, 30);
        let end_at = ongoing.end_at;
        lifecycle.transition(
            NotificationState::Mini {
                event: ongoing,
                urgent: false,
            },
            base_time() - Duration::minutes(1),
        );

        assert!(!lifecycle.tick(end_at + Duration::seconds(9)));
        assert!(lifecycle.tick(end_at + Duration::seconds(10)));
        assert!(lifecycle.state().is_none());
    }

    #[test]
    fn ended_full_clears_after_five_second_grace() {
        let mut lifecycle = NotificationLifecycle::new(LifecycleTimings {
            auto_hide: Duration::hours(2),
            ..LifecycleTimings::default()
        });
        let short = event("e1", 0, 1);
        let end_at = short.end_at;
        lifecycle.transition(NotificationState::Full { event: short }, base_time());
        lifecycle.pointer_entered();

        assert!(!lifecycle.tick(end_at + Duration::seconds(4)));
        assert!(lifecycle.tick(end_at + Duration::seconds(5)));
    }

    #[test]
    fn urgency_change_counts_as_a_new_presentation() {
        let mut lifecycle = NotificationLifecycle::new(LifecycleTimings::default());
        let upcoming = event("e1", 4, 30);
        lifecycle.transition(
            NotificationState::Mini {
                event: upcoming.clone(),
                urgent: true,
            },
            base_time(),
        );
        assert!(lifecycle.transition(
            NotificationState::Mini {
                event: upcoming,
                urgent: false,
            },
            base_time() + Duration::minutes(4),
        ));
    }

    #[test]
    fn countdown_formatting() {
        assert_eq!(format_countdown(Duration::seconds(3725)), "1h 2m");
        assert_eq!(format_countdown(Duration::seconds(270)), "4m 30s");
        assert_eq!(format_countdown(Duration::seconds(12)), "12s");
        assert_eq!(format_countdown(Duration::seconds(-3)), "0s");
    }

    #[test]
    fn countdown_label_tracks_event_phase() {
        let upcoming = event("e1", 10, 30);
        assert_eq!(countdown_label(&upcoming, base_time()), "Starts in 10m 0s");
        assert_eq!(
            countdown_label(&upcoming, base_time() + Duration::minutes(20)),
            "Ends in 20m 0s"
        );
        assert_eq!(
            countdown_label(&upcoming, base_time() + Duration::minutes(40)),
            "Event ended"
        );
    }
}
