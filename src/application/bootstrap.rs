use crate::infrastructure::calendar_port::{CalendarPort, UnconfiguredCalendarPort};
use crate::infrastructure::config::{ensure_default_configs, load_runtime_settings, RuntimeSettings};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::google_calendar_client::ReqwestGoogleCalendarClient;
use crate::infrastructure::storage::initialize_database;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const ACCESS_TOKEN_ENV: &str = "PLANNER_GOOGLE_ACCESS_TOKEN";

#[derive(Debug)]
pub struct BootstrapResult {
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
    pub settings: RuntimeSettings,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join("companion.sqlite");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let settings = load_runtime_settings(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        config_dir,
        logs_dir,
        database_path,
        settings,
    })
}

/// Google adapter when an access token is provided, otherwise a port that reports
/// the calendar as not connected.
pub fn calendar_port_for(
    settings: &RuntimeSettings,
    access_token: Option<String>,
) -> Arc<dyn CalendarPort> {
    let Some(access_token) = access_token.filter(|token| !token.trim().is_empty()) else {
        log::info!("no calendar access token; events are unavailable");
        return Arc::new(UnconfiguredCalendarPort);
    };
    match ReqwestGoogleCalendarClient::new(access_token, &settings.calendar_id, settings.max_events) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            log::warn!("calendar client not configured: {error}");
            Arc::new(UnconfiguredCalendarPort)
        }
    }
}

pub fn calendar_port_from_env(settings: &RuntimeSettings) -> Arc<dyn CalendarPort> {
    calendar_port_for(settings, std::env::var(ACCESS_TOKEN_ENV).ok())
}
