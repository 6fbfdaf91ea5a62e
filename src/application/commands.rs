use crate::application::background::BackgroundTasks;
use crate::application::block_sync::{BlockRuleSynchronizer, BlockSettings, ReconcileOutcome};
use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::event_monitor::{EventProximityMonitor, MonitorSettings};
use crate::application::time_accountant::TimeAccountant;
use crate::application::NowProvider;
use crate::domain::models::{BlockRule, CalendarEvent, DwellStats, NotificationState, TabInfo};
use crate::domain::notification::countdown_label;
use crate::infrastructure::blocking_port::{BlockingPort, BrowserTabs, InMemoryBrowserTabs};
use crate::infrastructure::calendar_port::CalendarPort;
use crate::infrastructure::config::RuntimeSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::presenter::NotificationPresenter;
use crate::infrastructure::state_store::{SqliteStateStore, StateStore};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Host-side collaborators the components talk to.
pub struct HostPorts {
    pub calendar: Arc<dyn CalendarPort>,
    pub blocking: Arc<dyn BlockingPort>,
    pub tabs: Arc<dyn BrowserTabs>,
    pub presenter: Arc<dyn NotificationPresenter>,
    /// Registry updated from `tabsChanged` messages when the host mirrors its pages.
    pub tab_mirror: Option<Arc<InMemoryBrowserTabs>>,
}

pub struct AppState {
    config_dir: PathBuf,
    database_path: PathBuf,
    logs_dir: PathBuf,
    settings: RuntimeSettings,
    accountant: Arc<TimeAccountant>,
    monitor: Arc<EventProximityMonitor>,
    blocker: Arc<BlockRuleSynchronizer>,
    blocking: Arc<dyn BlockingPort>,
    tab_mirror: Option<Arc<InMemoryBrowserTabs>>,
    background: tokio::sync::Mutex<Option<BackgroundTasks>>,
    shut_down: AtomicBool,
    now_provider: NowProvider,
    log_guard: Mutex<()>,
}

impl AppState {
    /// Prepares the workspace, opens the SQLite store and wires the components to the
    /// ports built from the loaded settings.
    pub fn new<F>(workspace_root: PathBuf, build_ports: F) -> Result<Self, InfraError>
    where
        F: FnOnce(&RuntimeSettings) -> HostPorts,
    {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store = Arc::new(SqliteStateStore::open(&bootstrap.database_path)?);
        let ports = build_ports(&bootstrap.settings);
        Ok(Self::with_store(bootstrap, store, ports, Arc::new(Utc::now)))
    }

    pub fn with_store(
        bootstrap: BootstrapResult,
        store: Arc<dyn StateStore>,
        ports: HostPorts,
        now_provider: NowProvider,
    ) -> Self {
        let settings = bootstrap.settings;
        let accountant = TimeAccountant::new(store.clone(), ports.tabs.clone())
            .with_now_provider(now_provider.clone());
        let monitor = EventProximityMonitor::new(
            ports.calendar,
            store.clone(),
            ports.presenter,
            MonitorSettings {
                windows: settings.windows,
                timings: settings.timings,
                lookahead: settings.lookahead,
                max_events: settings.max_events as usize,
            },
        )
        .with_now_provider(now_provider.clone());
        let blocker = BlockRuleSynchronizer::new(
            store,
            ports.blocking.clone(),
            ports.tabs,
            settings.blocked_page_url.clone(),
        );

        Self {
            config_dir: bootstrap.config_dir,
            database_path: bootstrap.database_path,
            logs_dir: bootstrap.logs_dir,
            settings,
            accountant: Arc::new(accountant),
            monitor: Arc::new(monitor),
            blocker: Arc::new(blocker),
            blocking: ports.blocking,
            tab_mirror: ports.tab_mirror,
            background: tokio::sync::Mutex::new(None),
            shut_down: AtomicBool::new(false),
            now_provider,
            log_guard: Mutex::new(()),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    /// Re-hydrates every component from the store. Does not start timers.
    pub async fn hydrate(&self) {
        self.accountant.hydrate().await;
        self.monitor.hydrate().await;
        self.blocker.hydrate().await;
        self.log_info("hydrate", "state restored from store");
    }

    pub async fn start_background(&self) {
        let mut background = self.background.lock().await;
        if background.is_some() || self.is_shut_down() {
            return;
        }
        *background = Some(BackgroundTasks::spawn(
            self.accountant.clone(),
            self.monitor.clone(),
            self.settings.poll_interval,
            self.settings.timezone,
        ));
    }

    /// Cancels background work and stops every component from mutating state.
    pub async fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(background) = self.background.lock().await.take() {
            background.shutdown().await;
        }
        self.accountant.teardown().await;
        self.monitor.teardown().await;
        self.blocker.teardown().await;
        self.log_info("shutdown", "companion stopped");
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), InfraError> {
        if self.is_shut_down() {
            return Err(InfraError::HostContextInvalidated);
        }
        Ok(())
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

pub async fn start_tracking_impl(state: &AppState) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.accountant.start().await;
    state.log_info("start_tracking", "tracking enabled");
    Ok(())
}

pub async fn stop_tracking_impl(state: &AppState) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.accountant.stop().await;
    state.log_info("stop_tracking", "tracking disabled");
    Ok(())
}

pub async fn get_tracking_stats_impl(state: &AppState) -> Result<DwellStats, InfraError> {
    state.ensure_running()?;
    Ok(state.accountant.get_stats().await)
}

pub async fn clear_tracking_data_impl(state: &AppState) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.accountant.clear().await;
    state.log_info("clear_tracking_data", "dwell record cleared");
    Ok(())
}

pub async fn get_current_events_impl(state: &AppState) -> Result<Vec<CalendarEvent>, InfraError> {
    state.ensure_running()?;
    let events = state.monitor.get_current_events().await?;
    state.log_info(
        "get_current_events",
        &format!("listed {} events", events.len()),
    );
    Ok(events)
}

pub async fn update_block_rules_impl(state: &AppState) -> Result<ReconcileOutcome, InfraError> {
    state.ensure_running()?;
    let outcome = state.blocker.refresh_from_store().await;
    state.log_info(
        "update_block_rules",
        &format!(
            "installed={} removed={}",
            outcome.installed_rules, outcome.removed_rules
        ),
    );
    Ok(outcome)
}

pub async fn toggle_blocker_impl(
    state: &AppState,
    enabled: bool,
) -> Result<ReconcileOutcome, InfraError> {
    state.ensure_running()?;
    let outcome = state.blocker.set_enabled(enabled).await;
    state.log_info("toggle_blocker", &format!("enabled={enabled}"));
    Ok(outcome)
}

pub async fn set_blocked_sites_impl(
    state: &AppState,
    sites: Vec<String>,
) -> Result<(BlockSettings, ReconcileOutcome), InfraError> {
    state.ensure_running()?;
    let outcome = state.blocker.set_desired(sites).await;
    let settings = state.blocker.settings().await;
    state.log_info("set_blocked_sites", &format!("blocked_sites={}", settings.sites.len()));
    Ok((settings, outcome))
}

pub async fn add_blocked_site_impl(state: &AppState, site: String) -> Result<Vec<String>, InfraError> {
    state.ensure_running()?;
    let sites = state.blocker.add_blocked_site(&site).await?;
    state.log_info("add_blocked_site", &format!("blocked_sites={}", sites.len()));
    Ok(sites)
}

pub async fn remove_blocked_site_impl(
    state: &AppState,
    site: String,
) -> Result<Vec<String>, InfraError> {
    state.ensure_running()?;
    let sites = state.blocker.remove_blocked_site(&site).await?;
    state.log_info("remove_blocked_site", &format!("blocked_sites={}", sites.len()));
    Ok(sites)
}

pub async fn get_block_settings_impl(state: &AppState) -> Result<BlockSettings, InfraError> {
    state.ensure_running()?;
    Ok(state.blocker.settings().await)
}

/// Rules the host should mirror into its own blocking primitive.
pub async fn get_active_rules_impl(state: &AppState) -> Result<Vec<BlockRule>, InfraError> {
    state.ensure_running()?;
    if !state.blocking.rules_available() {
        return Err(InfraError::BlockingPrimitiveUnavailable);
    }
    state.blocking.active_rules().await
}

pub async fn focus_changed_impl(state: &AppState, url: Option<String>) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.accountant.on_focus_changed(url.as_deref()).await;
    Ok(())
}

pub async fn navigated_impl(state: &AppState, url: String) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.accountant.on_navigated(&url).await;
    Ok(())
}

pub async fn tabs_changed_impl(
    state: &AppState,
    tabs: Vec<TabInfo>,
    active_tab_id: Option<i64>,
) -> Result<(), InfraError> {
    state.ensure_running()?;
    let mirror = state
        .tab_mirror
        .as_ref()
        .ok_or_else(|| InfraError::InvalidInput("host does not mirror tabs".to_string()))?;
    mirror.set_tabs(tabs, active_tab_id)
}

pub async fn refresh_events_impl(state: &AppState) -> Result<NotificationState, InfraError> {
    state.ensure_running()?;
    state.monitor.poll().await;
    Ok(state.monitor.current_state().await)
}

pub async fn push_events_impl(
    state: &AppState,
    events: Vec<CalendarEvent>,
) -> Result<NotificationState, InfraError> {
    state.ensure_running()?;
    state.monitor.push_events(events).await;
    Ok(state.monitor.current_state().await)
}

pub async fn dismiss_event_impl(state: &AppState, event_id: String) -> Result<(), InfraError> {
    state.ensure_running()?;
    if event_id.trim().is_empty() {
        return Err(InfraError::InvalidInput("event id must not be empty".to_string()));
    }
    state.monitor.dismiss_event(&event_id).await;
    state.log_info("dismiss_event", &format!("dismissed event_id={}", event_id.trim()));
    Ok(())
}

pub async fn close_notification_impl(state: &AppState) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.monitor.close_notification().await;
    Ok(())
}

pub async fn pointer_entered_impl(state: &AppState) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.monitor.pointer_entered().await;
    Ok(())
}

pub async fn pointer_left_impl(state: &AppState) -> Result<(), InfraError> {
    state.ensure_running()?;
    state.monitor.pointer_left().await;
    Ok(())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationView {
    #[serde(flatten)]
    pub state: NotificationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub countdown: Option<String>,
}

pub async fn get_notification_impl(state: &AppState) -> Result<NotificationView, InfraError> {
    state.ensure_running()?;
    let current = state.monitor.current_state().await;
    let now = (state.now_provider)();
    let countdown = current.event().map(|event| countdown_label(event, now));
    Ok(NotificationView {
        state: current,
        countdown,
    })
}

/// One message from the host. Field names follow the host's camelCase JSON.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum CommandRequest {
    Ping,
    StartTracking,
    StopTracking,
    GetTrackingStats,
    ClearTrackingData,
    GetCurrentEvents,
    UpdateBlockRules,
    ToggleBlocker {
        enabled: bool,
    },
    SetBlockedSites {
        sites: Vec<String>,
    },
    AddBlockedSite {
        site: String,
    },
    RemoveBlockedSite {
        site: String,
    },
    GetBlockSettings,
    GetActiveRules,
    #[serde(rename_all = "camelCase")]
    FocusChanged {
        #[serde(default)]
        url: Option<String>,
    },
    Navigated {
        url: String,
    },
    #[serde(rename_all = "camelCase")]
    TabsChanged {
        tabs: Vec<TabInfo>,
        #[serde(default)]
        active_tab_id: Option<i64>,
    },
    RefreshEvents,
    PushEvents {
        events: Vec<CalendarEvent>,
    },
    #[serde(rename_all = "camelCase")]
    DismissEvent {
        event_id: String,
    },
    CloseNotification,
    PointerEntered,
    PointerLeft,
    GetNotification,
}

impl CommandRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::StartTracking => "start_tracking",
            Self::StopTracking => "stop_tracking",
            Self::GetTrackingStats => "get_tracking_stats",
            Self::ClearTrackingData => "clear_tracking_data",
            Self::GetCurrentEvents => "get_current_events",
            Self::UpdateBlockRules => "update_block_rules",
            Self::ToggleBlocker { .. } => "toggle_blocker",
            Self::SetBlockedSites { .. } => "set_blocked_sites",
            Self::AddBlockedSite { .. } => "add_blocked_site",
            Self::RemoveBlockedSite { .. } => "remove_blocked_site",
            Self::GetBlockSettings => "get_block_settings",
            Self::GetActiveRules => "get_active_rules",
            Self::FocusChanged { .. } => "focus_changed",
            Self::Navigated { .. } => "navigated",
            Self::TabsChanged { .. } => "tabs_changed",
            Self::RefreshEvents => "refresh_events",
            Self::PushEvents { .. } => "push_events",
            Self::DismissEvent { .. } => "dismiss_event",
            Self::CloseNotification => "close_notification",
            Self::PointerEntered => "pointer_entered",
            Self::PointerLeft => "pointer_left",
            Self::GetNotification => "get_notification",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl CommandResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: Map::new(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            data: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: impl Serialize) -> Result<Self, InfraError> {
        self.data.insert(key.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Merges the fields of a serialized struct into the response body.
    fn with_fields(mut self, value: impl Serialize) -> Result<Self, InfraError> {
        if let Value::Object(fields) = serde_json::to_value(value)? {
            self.data.extend(fields);
        }
        Ok(self)
    }
}

pub async fn dispatch(state: &AppState, request: CommandRequest) -> CommandResponse {
    let command = request.name();
    match execute(state, request).await {
        Ok(response) => response,
        Err(error) => CommandResponse::failure(state.command_error(command, &error)),
    }
}

async fn execute(state: &AppState, request: CommandRequest) -> Result<CommandResponse, InfraError> {
    let ok = CommandResponse::ok();
    match request {
        CommandRequest::Ping => ok.with("message", "pong"),
        CommandRequest::StartTracking => start_tracking_impl(state).await.map(|_| ok),
        CommandRequest::StopTracking => stop_tracking_impl(state).await.map(|_| ok),
        CommandRequest::GetTrackingStats => ok.with_fields(get_tracking_stats_impl(state).await?),
        CommandRequest::ClearTrackingData => clear_tracking_data_impl(state).await.map(|_| ok),
        CommandRequest::GetCurrentEvents => ok.with("events", get_current_events_impl(state).await?),
        CommandRequest::UpdateBlockRules => ok.with("reconcile", update_block_rules_impl(state).await?),
        CommandRequest::ToggleBlocker { enabled } => {
            ok.with("reconcile", toggle_blocker_impl(state, enabled).await?)
        }
        CommandRequest::SetBlockedSites { sites } => {
            let (settings, outcome) = set_blocked_sites_impl(state, sites).await?;
            ok.with("sites", settings.sites)?.with("reconcile", outcome)
        }
        CommandRequest::AddBlockedSite { site } => {
            ok.with("sites", add_blocked_site_impl(state, site).await?)
        }
        CommandRequest::RemoveBlockedSite { site } => {
            ok.with("sites", remove_blocked_site_impl(state, site).await?)
        }
        CommandRequest::GetBlockSettings => ok.with_fields(get_block_settings_impl(state).await?),
        CommandRequest::GetActiveRules => ok.with("rules", get_active_rules_impl(state).await?),
        CommandRequest::FocusChanged { url } => focus_changed_impl(state, url).await.map(|_| ok),
        CommandRequest::Navigated { url } => navigated_impl(state, url).await.map(|_| ok),
        CommandRequest::TabsChanged {
            tabs,
            active_tab_id,
        } => tabs_changed_impl(state, tabs, active_tab_id)
            .await
            .map(|_| ok),
        CommandRequest::RefreshEvents => ok.with("notification", refresh_events_impl(state).await?),
        CommandRequest::PushEvents { events } => {
            ok.with("notification", push_events_impl(state, events).await?)
        }
        CommandRequest::DismissEvent { event_id } => {
            dismiss_event_impl(state, event_id).await.map(|_| ok)
        }
        CommandRequest::CloseNotification => close_notification_impl(state).await.map(|_| ok),
        CommandRequest::PointerEntered => pointer_entered_impl(state).await.map(|_| ok),
        CommandRequest::PointerLeft => pointer_left_impl(state).await.map(|_| ok),
        CommandRequest::GetNotification => ok.with("notification", get_notification_impl(state).await?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::blocking_port::InMemoryBlockingPort;
    use crate::infrastructure::calendar_port::InMemoryCalendarPort;
    use crate::infrastructure::presenter::RecordingPresenter;
    use chrono::{DateTime, Duration};
    use serde_json::json;
    use std::fs;
    use std::sync::atomic::AtomicUsize;

    static NEXT_TEMP_WORKSPACE: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_WORKSPACE.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "planner-command-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }

        fn harness(&self) -> Harness {
            let calendar = Arc::new(InMemoryCalendarPort::with_events(vec![event("e1", 10)]));
            let blocking = Arc::new(InMemoryBlockingPort::default());
            let tabs = Arc::new(InMemoryBrowserTabs::with_tabs(
                vec![TabInfo {
                    id: 1,
                    url: Some("https://example.com/".to_string()),
                }],
                Some(1),
            ));
            let bootstrap = bootstrap_workspace(&self.path).expect("bootstrap workspace");
            let store = Arc::new(SqliteStateStore::open(&bootstrap.database_path).expect("open store"));
            let state = AppState::with_store(
                bootstrap,
                store,
                HostPorts {
                    calendar: calendar.clone(),
                    blocking: blocking.clone(),
                    tabs: tabs.clone(),
                    presenter: Arc::new(RecordingPresenter::default()),
                    tab_mirror: Some(tabs),
                },
                Arc::new(fixed_time),
            );
            Harness {
                state,
                calendar,
                blocking,
            }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    struct Harness {
        state: AppState,
        calendar: Arc<InMemoryCalendarPort>,
        blocking: Arc<InMemoryBlockingPort>,
    }

    fn fixed_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-02-16T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc)
    }

    fn event(id: &str, start_in_minutes: i64) -> CalendarEvent {
        let start_at = fixed_time() + Duration::minutes(start_in_minutes);
        CalendarEvent {
            id: id.to_string(),
            summary: format!("Event {id}"),
            location: None,
            start_at,
            end_at: start_at + Duration::minutes(30),
            all_day: false,
        }
    }

    fn to_json(response: &CommandResponse) -> Value {
        serde_json::to_value(response).expect("serialize response")
    }

    #[test]
    fn requests_parse_from_host_json() {
        let request: CommandRequest =
            serde_json::from_str(r#"{"action":"toggleBlocker","enabled":true}"#).expect("parse");
        assert_eq!(request, CommandRequest::ToggleBlocker { enabled: true });

        let request: CommandRequest =
            serde_json::from_str(r#"{"action":"dismissEvent","eventId":"e1"}"#).expect("parse");
        assert_eq!(
            request,
            CommandRequest::DismissEvent {
                event_id: "e1".to_string()
            }
        );

        let request: CommandRequest =
            serde_json::from_str(r#"{"action":"focusChanged"}"#).expect("parse");
        assert_eq!(request, CommandRequest::FocusChanged { url: None });

        assert!(serde_json::from_str::<CommandRequest>(r#"{"action":"launchRockets"}"#).is_err());
    }

    #[tokio::test]
    async fn tracking_stats_response_has_expected_shape() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        let response = dispatch(&h.state, CommandRequest::StartTracking).await;
        assert_eq!(to_json(&response), json!({"success": true}));

        let response = dispatch(&h.state, CommandRequest::GetTrackingStats).await;
        let body = to_json(&response);
        assert_eq!(body["success"], json!(true));
        assert_eq!(body["isActive"], json!(true));
        assert!(body["stats"].is_object());
    }

    #[tokio::test]
    async fn blocker_commands_install_and_persist_rules() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        let response = dispatch(
            &h.state,
            CommandRequest::AddBlockedSite {
                site: "www.example.com".to_string(),
            },
        )
        .await;
        assert_eq!(to_json(&response)["sites"], json!(["example.com"]));

        dispatch(&h.state, CommandRequest::ToggleBlocker { enabled: true }).await;
        assert_eq!(h.blocking.rules().expect("rules").len(), 1);

        let response = dispatch(&h.state, CommandRequest::GetBlockSettings).await;
        assert_eq!(
            to_json(&response),
            json!({"success": true, "sites": ["example.com"], "enabled": true})
        );

        let response = dispatch(&h.state, CommandRequest::GetActiveRules).await;
        assert_eq!(
            to_json(&response)["rules"],
            json!([{
                "id": 1,
                "priority": 1,
                "action": {"type": "block"},
                "condition": {"urlFilter": "||example.com^", "resourceTypes": ["main_frame"]}
            }])
        );

        let response = dispatch(
            &h.state,
            CommandRequest::AddBlockedSite {
                site: "example.com".to_string(),
            },
        )
        .await;
        assert!(!response.success);
        assert!(response.error.unwrap_or_default().contains("already blocked"));
    }

    #[tokio::test]
    async fn calendar_failures_surface_as_error_responses() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        h.calendar.set_failing(true);
        let response = dispatch(&h.state, CommandRequest::GetCurrentEvents).await;
        assert!(!response.success);

        let log = fs::read_to_string(workspace.path.join("logs").join("commands.log"))
            .expect("read command log");
        assert!(log.contains("\"command\":\"get_current_events\""));
        assert!(log.contains("\"level\":\"error\""));
    }

    #[tokio::test]
    async fn pushed_events_drive_the_notification() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        let response = dispatch(
            &h.state,
            CommandRequest::PushEvents {
                events: vec![event("soon", 3)],
            },
        )
        .await;
        assert!(response.success);

        let response = dispatch(&h.state, CommandRequest::GetNotification).await;
        let body = to_json(&response);
        assert_eq!(body["notification"]["tier"], json!("mini"));
        assert_eq!(body["notification"]["urgent"], json!(true));
        assert_eq!(body["notification"]["countdown"], json!("Starts in 3m 0s"));
    }

    #[tokio::test]
    async fn settings_survive_a_restart() {
        let workspace = TempWorkspace::new();
        {
            let h = workspace.harness();
            dispatch(
                &h.state,
                CommandRequest::AddBlockedSite {
                    site: "docs.rs".to_string(),
                },
            )
            .await;
            dispatch(&h.state, CommandRequest::ToggleBlocker { enabled: true }).await;
            dispatch(
                &h.state,
                CommandRequest::DismissEvent {
                    event_id: "e1".to_string(),
                },
            )
            .await;
            h.state.shutdown().await;
        }

        let h = workspace.harness();
        h.state.hydrate().await;
        assert_eq!(h.blocking.rules().expect("rules").len(), 1);
        let response = dispatch(&h.state, CommandRequest::RefreshEvents).await;
        assert_eq!(to_json(&response)["notification"], json!({"tier": "none"}));
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        h.state.start_background().await;
        h.state.shutdown().await;
        let response = dispatch(&h.state, CommandRequest::StartTracking).await;
        assert!(!response.success);
        assert_eq!(response.error.as_deref(), Some("Host context invalidated"));
    }

    #[tokio::test]
    async fn replacing_the_block_list_normalizes_and_reconciles() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        dispatch(&h.state, CommandRequest::ToggleBlocker { enabled: true }).await;

        let request: CommandRequest = serde_json::from_str(
            r#"{"action":"setBlockedSites","sites":["Example.com","https://www.example.com/x","news.site"]}"#,
        )
        .expect("parse");
        let body = to_json(&dispatch(&h.state, request).await);

        assert_eq!(body["sites"], json!(["example.com", "news.site"]));
        assert_eq!(body["reconcile"]["installedRules"], json!(2));
        assert_eq!(h.blocking.rules().expect("rules").len(), 2);
    }

    #[tokio::test]
    async fn blank_event_id_is_an_input_error() {
        let workspace = TempWorkspace::new();
        let h = workspace.harness();
        let response = dispatch(
            &h.state,
            CommandRequest::DismissEvent {
                event_id: "  ".to_string(),
            },
        )
        .await;
        assert!(!response.success);
        assert_eq!(
            response.error.as_deref(),
            Some("Invalid input: event id must not be empty")
        );
    }
}
