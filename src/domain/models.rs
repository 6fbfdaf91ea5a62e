use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Domain -> accumulated dwell seconds.
pub type DwellRecord = BTreeMap<String, u64>;

/// Ids of events the user dismissed. Never pruned.
pub type DismissalSet = BTreeSet<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub domain: String,
    pub started_at: DateTime<Utc>,
}

impl ActiveSession {
    pub fn new(domain: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            domain: domain.into(),
            started_at,
        }
    }

    /// Whole seconds since the session (re)started; a clock that went backwards counts as zero.
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u64 {
        let elapsed = (now - self.started_at).num_seconds();
        u64::try_from(elapsed).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DwellStats {
    pub stats: DwellRecord,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub id: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[serde(default)]
    pub all_day: bool,
}

impl CalendarEvent {
    pub fn validate(&self) -> Result<(), String> {
        validate_non_empty(&self.id, "event.id")?;
        if self.end_at < self.start_at {
            return Err("event.end_at must not be before event.start_at".to_string());
        }
        Ok(())
    }

    pub fn is_ongoing(&self, now: DateTime<Utc>) -> bool {
        self.start_at <= now && now < self.end_at
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum NotificationState {
    #[default]
    None,
    Full {
        event: CalendarEvent,
    },
    Mini {
        event: CalendarEvent,
        urgent: bool,
    },
}

impl NotificationState {
    pub fn event(&self) -> Option<&CalendarEvent> {
        match self {
            Self::None => None,
            Self::Full { event } | Self::Mini { event, .. } => Some(event),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }

    pub fn tier_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Full { .. } => "full",
            Self::Mini { urgent: true, .. } => "mini_urgent",
            Self::Mini { urgent: false, .. } => "mini",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleActionType {
    Block,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    MainFrame,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub action_type: RuleActionType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<ResourceType>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl BlockRule {
    pub fn validate(&self) -> Result<(), String> {
        if self.id == 0 {
            return Err("rule.id must be >= 1".to_string());
        }
        validate_non_empty(&self.condition.url_filter, "rule.condition.url_filter")?;
        if self.condition.resource_types.is_empty() {
            return Err("rule.condition.resource_types must not be empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn validate_non_empty(value: &str, field_name: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field_name} must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_time(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value)
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn sample_event() -> CalendarEvent {
        CalendarEvent {
            id: "evt-1".to_string(),
            summary: "Standup".to_string(),
            location: None,
            start_at: fixed_time("2026-02-16T09:00:00Z"),
            end_at: fixed_time("2026-02-16T09:15:00Z"),
            all_day: false,
        }
    }

    #[test]
    fn elapsed_seconds_floors_partial_seconds() {
        let session = ActiveSession::new("example.com", fixed_time("2026-02-16T09:00:00Z"));
        let now = fixed_time("2026-02-16T09:00:02.900Z");
        assert_eq!(session.elapsed_seconds(now), 2);
    }

    #[test]
    fn elapsed_seconds_is_zero_when_clock_goes_backwards() {
        let session = ActiveSession::new("example.com", fixed_time("2026-02-16T09:00:00Z"));
        assert_eq!(session.elapsed_seconds(fixed_time("2026-02-16T08:59:00Z")), 0);
    }

    #[test]
    fn event_validation_rejects_inverted_range() {
        let mut event = sample_event();
        event.end_at = fixed_time("2026-02-16T08:00:00Z");
        assert!(event.validate().is_err());
    }

    #[test]
    fn event_validation_rejects_blank_id() {
        let mut event = sample_event();
        event.id = "  ".to_string();
        assert!(event.validate().is_err());
    }

    #[test]
    fn ongoing_window_is_half_open() {
        let event = sample_event();
        assert!(event.is_ongoing(event.start_at));
        assert!(!event.is_ongoing(event.end_at));
        assert!(event.has_ended(event.end_at));
    }

    #[test]
    fn notification_state_serializes_as_tagged_variant() {
        let state = NotificationState::Mini {
            event: sample_event(),
            urgent: true,
        };
        let value = serde_json::to_value(&state).expect("serialize state");
        assert_eq!(value["tier"], "mini");
        assert_eq!(value["urgent"], true);
        assert_eq!(state.tier_name(), "mini_urgent");
        assert_eq!(
            serde_json::to_value(NotificationState::None).expect("serialize none")["tier"],
            "none"
        );
    }

    #[test]
    fn block_rule_serializes_in_declarative_shape() {
        let rule = BlockRule {
            id: 1,
            priority: 1,
            action: RuleAction {
                action_type: RuleActionType::Block,
            },
            condition: RuleCondition {
                url_filter: "||example.com^".to_string(),
                resource_types: vec![ResourceType::MainFrame],
            },
        };
        let value = serde_json::to_value(&rule).expect("serialize rule");
        assert_eq!(value["action"]["type"], "block");
        assert_eq!(value["condition"]["urlFilter"], "||example.com^");
        assert_eq!(value["condition"]["resourceTypes"][0], "main_frame");
        assert!(rule.validate().is_ok());
    }
}
