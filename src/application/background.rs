use crate::application::event_monitor::EventProximityMonitor;
use crate::application::time_accountant::TimeAccountant;
use chrono::{DateTime, Duration, Local, TimeZone, Utc};
use chrono_tz::Tz;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

const LIFECYCLE_TICK: std::time::Duration = std::time::Duration::from_secs(1);
const FALLBACK_DAY: std::time::Duration = std::time::Duration::from_secs(24 * 60 * 60);

/// First instant of the day after `after`'s local date. A midnight skipped by a DST
/// jump resolves to the first existing local time after it.
pub fn next_midnight(after: DateTime<Utc>, timezone: Option<Tz>) -> Option<DateTime<Utc>> {
    match timezone {
        Some(zone) => next_midnight_in(after, &zone),
        None => next_midnight_in(after, &Local),
    }
}

fn next_midnight_in<Z: TimeZone>(after: DateTime<Utc>, zone: &Z) -> Option<DateTime<Utc>> {
    let next_day = after.with_timezone(zone).date_naive().succ_opt()?;
    let mut candidate = next_day.and_hms_opt(0, 0, 0)?;
    for _ in 0..4 {
        if let Some(resolved) = zone.from_local_datetime(&candidate).earliest() {
            return Some(resolved.with_timezone(&Utc));
        }
        candidate += Duration::hours(1);
    }
    None
}

fn until(target: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
    (target - now).to_std().unwrap_or_default()
}

/// Periodic work owned by the running companion; cancelled as a group.
pub struct BackgroundTasks {
    cancel_token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn spawn(
        accountant: Arc<TimeAccountant>,
        monitor: Arc<EventProximityMonitor>,
        poll_interval: std::time::Duration,
        timezone: Option<Tz>,
    ) -> Self {
        let cancel_token = CancellationToken::new();
        let handles = vec![
            tokio::spawn(daily_reset_loop(accountant, timezone, cancel_token.clone())),
            tokio::spawn(poll_loop(monitor.clone(), poll_interval, cancel_token.clone())),
            tokio::spawn(lifecycle_loop(monitor, cancel_token.clone())),
        ];
        Self {
            cancel_token,
            handles,
        }
    }

    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        for handle in self.handles {
            if let Err(error) = handle.await {
                log::warn!("background task failed to join: {error}");
            }
        }
        log::info!("background tasks stopped");
    }
}

async fn daily_reset_loop(
    accountant: Arc<TimeAccountant>,
    timezone: Option<Tz>,
    cancel_token: CancellationToken,
) {
    let mut after = Utc::now();
    loop {
        let Some(target) = next_midnight(after, timezone) else {
            log::warn!("could not resolve next midnight; retrying in a day");
            tokio::select! {
                _ = cancel_token.cancelled() => return,
                _ = tokio::time::sleep(FALLBACK_DAY) => {}
            }
            after = Utc::now();
            continue;
        };

        // Sleep until the wall clock has actually passed midnight; timers can drift.
        while Utc::now() < target {
            tokio::select! {
                _ = cancel_token.cancelled() => return,
                _ = tokio::time::sleep(until(target, Utc::now())) => {}
            }
        }

        accountant.daily_reset().await;
        after = Utc::now().max(target);
    }
}

async fn poll_loop(
    monitor: Arc<EventProximityMonitor>,
    period: std::time::Duration,
    cancel_token: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = interval.tick() => {}
        }
        // A fetch can hang; cancellation must not wait for it.
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = monitor.poll() => {}
        }
    }
}

async fn lifecycle_loop(monitor: Arc<EventProximityMonitor>, cancel_token: CancellationToken) {
    let mut interval = tokio::time::interval(LIFECYCLE_TICK);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = interval.tick() => monitor.tick().await,
        }
    }
}
