use planner_companion::application::bootstrap::calendar_port_from_env;
use planner_companion::infrastructure::blocking_port::{InMemoryBlockingPort, InMemoryBrowserTabs};
use planner_companion::infrastructure::presenter::LogPresenter;
use planner_companion::{dispatch, AppState, CommandRequest, CommandResponse, HostPorts, InfraError};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const BLOCKING_MODE_ENV: &str = "PLANNER_BLOCKING_MODE";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(error) = run().await {
        log::error!("companion exited with error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), InfraError> {
    let workspace_root = match std::env::args().nth(1) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    let rules_available = std::env::var(BLOCKING_MODE_ENV)
        .map(|mode| !mode.eq_ignore_ascii_case("redirect"))
        .unwrap_or(true);

    let tabs = Arc::new(InMemoryBrowserTabs::default());
    let state = AppState::new(workspace_root, |settings| HostPorts {
        calendar: calendar_port_from_env(settings),
        blocking: Arc::new(InMemoryBlockingPort::new(rules_available)),
        tabs: tabs.clone(),
        presenter: Arc::new(LogPresenter),
        tab_mirror: Some(tabs.clone()),
    })?;
    log::info!(
        "{} started; config={} database={}",
        state.settings().app_name,
        state.config_dir().display(),
        state.database_path().display()
    );

    state.hydrate().await;
    state.start_background().await;

    let result = serve(&state).await;
    state.shutdown().await;
    result
}

/// One JSON request per stdin line, one JSON response per stdout line.
async fn serve(state: &AppState) -> Result<(), InfraError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupt received");
                return Ok(());
            }
        };
        let Some(line) = line else {
            log::info!("host closed the channel");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<CommandRequest>(&line) {
            Ok(request) => dispatch(state, request).await,
            Err(error) => CommandResponse::failure(format!("invalid request: {error}")),
        };
        let encoded = serde_json::to_string(&response)?;
        stdout.write_all(encoded.as_bytes()).await?;
        stdout.write_all(b"\n").await?;
        stdout.flush().await?;
    }
}
