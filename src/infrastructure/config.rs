use crate::domain::classification::ProximityWindows;
use crate::domain::notification::LifecycleTimings;
use crate::infrastructure::error::InfraError;
use chrono::Duration;
use chrono_tz::Tz;
use serde_json::Value;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const DEFAULT_APP_NAME: &str = "Planner Companion";
const DEFAULT_CALENDAR_ID: &str = "primary";
const DEFAULT_BLOCKED_PAGE_URL: &str = "blocked.html";
const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 30;
const DEFAULT_LOOKAHEAD_HOURS: i64 = 24;
const DEFAULT_MAX_EVENTS: u32 = 10;

fn default_app_config() -> Value {
    serde_json::json!({
        "schema": 1,
        "appName": DEFAULT_APP_NAME,
        "timezone": null,
        "calendarId": DEFAULT_CALENDAR_ID,
        "pollIntervalSeconds": DEFAULT_POLL_INTERVAL_SECONDS,
        "lookaheadHours": DEFAULT_LOOKAHEAD_HOURS,
        "maxEvents": DEFAULT_MAX_EVENTS,
        "blockedPageUrl": DEFAULT_BLOCKED_PAGE_URL,
        "notifications": {
            "fullWindowMinutes": 15,
            "urgentWindowMinutes": 5,
            "autoHideSeconds": 30,
            "fullEndGraceSeconds": 5,
            "miniEndGraceSeconds": 10
        }
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeSettings {
    pub app_name: String,
    /// `None` means the host's local zone.
    pub timezone: Option<Tz>,
    pub calendar_id: String,
    pub poll_interval: std::time::Duration,
    pub lookahead: Duration,
    pub max_events: u32,
    pub blocked_page_url: String,
    pub windows: ProximityWindows,
    pub timings: LifecycleTimings,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            app_name: DEFAULT_APP_NAME.to_string(),
            timezone: None,
            calendar_id: DEFAULT_CALENDAR_ID.to_string(),
            poll_interval: std::time::Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
            lookahead: Duration::hours(DEFAULT_LOOKAHEAD_HOURS),
            max_events: DEFAULT_MAX_EVENTS,
            blocked_page_url: DEFAULT_BLOCKED_PAGE_URL.to_string(),
            windows: ProximityWindows::default(),
            timings: LifecycleTimings::default(),
        }
    }
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    let path = config_dir.join(APP_JSON);
    if !path.exists() {
        let formatted = serde_json::to_string_pretty(&default_app_config())?;
        fs::write(path, format!("{formatted}\n"))?;
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != 1 {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

fn read_str<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn read_positive(value: &Value, key: &str) -> Option<u64> {
    value.get(key).and_then(Value::as_u64).filter(|value| *value > 0)
}

pub fn parse_timezone(name: &str) -> Result<Tz, InfraError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

pub fn load_runtime_settings(config_dir: &Path) -> Result<RuntimeSettings, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    let defaults = RuntimeSettings::default();
    let notifications = app.get("notifications").cloned().unwrap_or(Value::Null);

    let timezone = read_str(&app, "timezone").map(parse_timezone).transpose()?;

    let mut windows = ProximityWindows {
        full_window: read_positive(&notifications, "fullWindowMinutes")
            .map(|minutes| Duration::minutes(minutes as i64))
            .unwrap_or(defaults.windows.full_window),
        urgent_window: read_positive(&notifications, "urgentWindowMinutes")
            .map(|minutes| Duration::minutes(minutes as i64))
            .unwrap_or(defaults.windows.urgent_window),
    };
    if windows.urgent_window > windows.full_window {
        log::warn!("urgentWindowMinutes exceeds fullWindowMinutes; using defaults");
        windows = defaults.windows;
    }

    let timings = LifecycleTimings {
        auto_hide: read_positive(&notifications, "autoHideSeconds")
            .map(|seconds| Duration::seconds(seconds as i64))
            .unwrap_or(defaults.timings.auto_hide),
        full_end_grace: read_positive(&notifications, "fullEndGraceSeconds")
            .map(|seconds| Duration::seconds(seconds as i64))
            .unwrap_or(defaults.timings.full_end_grace),
        mini_end_grace: read_positive(&notifications, "miniEndGraceSeconds")
            .map(|seconds| Duration::seconds(seconds as i64))
            .unwrap_or(defaults.timings.mini_end_grace),
    };

    Ok(RuntimeSettings {
        app_name: read_str(&app, "appName")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.app_name),
        timezone,
        calendar_id: read_str(&app, "calendarId")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.calendar_id),
        poll_interval: read_positive(&app, "pollIntervalSeconds")
            .map(std::time::Duration::from_secs)
            .unwrap_or(defaults.poll_interval),
        lookahead: read_positive(&app, "lookaheadHours")
            .map(|hours| Duration::hours(hours as i64))
            .unwrap_or(defaults.lookahead),
        max_events: read_positive(&app, "maxEvents")
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(defaults.max_events),
        blocked_page_url: read_str(&app, "blockedPageUrl")
            .map(ToOwned::to_owned)
            .unwrap_or(defaults.blocked_page_url),
        windows,
        timings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_CONFIG: AtomicUsize = AtomicUsize::new(0);

    struct TempConfigDir {
        path: PathBuf,
    }

    impl TempConfigDir {
        fn new() -> Self {
            let sequence = NEXT_TEMP_CONFIG.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "planner-config-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp config dir");
            Self { path }
        }

        fn write_app(&self, value: Value) {
            let formatted = serde_json::to_string_pretty(&value).expect("format config");
            fs::write(self.path.join(APP_JSON), formatted).expect("write app config");
        }
    }

    impl Drop for TempConfigDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn defaults_are_written_and_loaded() {
        let dir = TempConfigDir::new();
        ensure_default_configs(&dir.path).expect("write defaults");
        let settings = load_runtime_settings(&dir.path).expect("load settings");
        assert_eq!(settings, RuntimeSettings::default());
    }

    #[test]
    fn existing_config_is_not_overwritten() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({"schema": 1, "pollIntervalSeconds": 60}));
        ensure_default_configs(&dir.path).expect("ensure defaults");
        let settings = load_runtime_settings(&dir.path).expect("load settings");
        assert_eq!(settings.poll_interval, std::time::Duration::from_secs(60));
        assert_eq!(settings.calendar_id, "primary");
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({"schema": 2}));
        match load_runtime_settings(&dir.path) {
            Err(InfraError::InvalidConfig(message)) => assert!(message.contains("unsupported schema")),
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn timezone_is_parsed_and_validated() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({"schema": 1, "timezone": "Asia/Kolkata"}));
        let settings = load_runtime_settings(&dir.path).expect("load settings");
        assert_eq!(settings.timezone, Some(chrono_tz::Asia::Kolkata));

        dir.write_app(serde_json::json!({"schema": 1, "timezone": "Mars/Olympus"}));
        assert!(matches!(
            load_runtime_settings(&dir.path),
            Err(InfraError::InvalidConfig(_))
        ));
    }

    #[test]
    fn invalid_fields_fall_back_to_defaults() {
        let dir = TempConfigDir::new();
        dir.write_app(serde_json::json!({
            "schema": 1,
            "pollIntervalSeconds": 0,
            "maxEvents": "ten",
            "notifications": {"fullWindowMinutes": 3, "urgentWindowMinutes": 5}
        }));
        let settings = load_runtime_settings(&dir.path).expect("load settings");
        assert_eq!(settings.poll_interval, std::time::Duration::from_secs(30));
        assert_eq!(settings.max_events, 10);
        assert_eq!(settings.windows, ProximityWindows::default());
    }
}
