use crate::application::NowProvider;
use crate::domain::models::{ActiveSession, DwellRecord, DwellStats};
use crate::domain::sites::trackable_domain;
use crate::infrastructure::blocking_port::BrowserTabs;
use crate::infrastructure::state_store::{
    decode_or_default, StateEntries, StateStore, KEY_IS_TRACKING, KEY_TRACKING_DATA,
};
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slice {
    Record,
    Flag,
    Both,
}

#[derive(Debug, Default)]
struct AccountantState {
    tracking: bool,
    record: DwellRecord,
    session: Option<ActiveSession>,
    /// Last URL reported by a focus or navigation signal, trackable or not.
    focused_url: Option<String>,
    focus_epoch: u64,
    torn_down: bool,
}

impl AccountantState {
    /// Closes the active session into the record. Returns `true` when seconds were added.
    fn close_session(&mut self, now: DateTime<Utc>) -> bool {
        let Some(session) = self.session.take() else {
            return false;
        };
        let elapsed = session.elapsed_seconds(now);
        if elapsed == 0 {
            return false;
        }
        *self.record.entry(session.domain).or_insert(0) += elapsed;
        true
    }

    /// Credits the active session without closing it; the session clock moves forward by
    /// exactly the credited seconds so the sub-second remainder carries over.
    fn checkpoint_session(&mut self, now: DateTime<Utc>) -> bool {
        let Some(session) = self.session.as_mut() else {
            return false;
        };
        let elapsed = session.elapsed_seconds(now);
        if elapsed == 0 {
            return false;
        }
        session.started_at += Duration::seconds(elapsed as i64);
        *self.record.entry(session.domain.clone()).or_insert(0) += elapsed;
        true
    }

    fn open_session(&mut self, url: Option<&str>, now: DateTime<Utc>) {
        if !self.tracking {
            return;
        }
        if let Some(domain) = url.and_then(trackable_domain) {
            self.session = Some(ActiveSession::new(domain, now));
        }
    }
}

/// Attributes focused wall-clock time to domains.
pub struct TimeAccountant {
    store: Arc<dyn StateStore>,
    tabs: Arc<dyn BrowserTabs>,
    state: Mutex<AccountantState>,
    persist_lock: Mutex<()>,
    now_provider: NowProvider,
}

impl TimeAccountant {
    pub fn new(store: Arc<dyn StateStore>, tabs: Arc<dyn BrowserTabs>) -> Self {
        Self {
            store,
            tabs,
            state: Mutex::new(AccountantState::default()),
            persist_lock: Mutex::new(()),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    /// Loads persisted totals and resumes tracking when it was left on.
    pub async fn hydrate(&self) {
        let loaded = match self.store.get(&[KEY_TRACKING_DATA, KEY_IS_TRACKING]).await {
            Ok(loaded) => loaded,
            Err(error) => {
                log::warn!("failed to load tracking state: {error}");
                return;
            }
        };
        let stored: DwellRecord = decode_or_default(&loaded, KEY_TRACKING_DATA);
        let was_tracking: bool = decode_or_default(&loaded, KEY_IS_TRACKING);

        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            for (domain, seconds) in stored {
                *state.record.entry(domain).or_insert(0) += seconds;
            }
        }

        if was_tracking {
            log::info!("resuming time tracking from stored state");
            self.start().await;
        }
    }

    pub async fn start(&self) {
        let focus_epoch = {
            let state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.focus_epoch
        };

        let active_url = match self.tabs.active_tab().await {
            Ok(tab) => tab.and_then(|tab| tab.url),
            Err(error) => {
                log::warn!("failed to query active tab: {error}");
                None
            }
        };

        let now = (self.now_provider)();
        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.tracking = true;
            if state.session.is_none() {
                // A focus signal that arrived during the query is newer than its answer.
                let url = if state.focus_epoch == focus_epoch {
                    active_url.or_else(|| state.focused_url.clone())
                } else {
                    state.focused_url.clone()
                };
                state.open_session(url.as_deref(), now);
            }
        }
        self.persist(Slice::Flag).await;
    }

    pub async fn stop(&self) {
        let now = (self.now_provider)();
        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.close_session(now);
            state.tracking = false;
        }
        self.persist(Slice::Both).await;
    }

    pub async fn on_focus_changed(&self, url: Option<&str>) {
        self.switch_to(url).await;
    }

    pub async fn on_navigated(&self, url: &str) {
        self.switch_to(Some(url)).await;
    }

    async fn switch_to(&self, url: Option<&str>) {
        let now = (self.now_provider)();
        let credited = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.focus_epoch += 1;
            state.focused_url = url.map(ToOwned::to_owned);
            let credited = state.close_session(now);
            state.open_session(url, now);
            credited
        };
        if credited {
            self.persist(Slice::Record).await;
        }
    }

    /// Current totals including the open session, which keeps running.
    pub async fn get_stats(&self) -> DwellStats {
        let now = (self.now_provider)();
        let (stats, credited) = {
            let mut state = self.state.lock().await;
            let credited = !state.torn_down && state.checkpoint_session(now);
            (
                DwellStats {
                    stats: state.record.clone(),
                    is_active: state.tracking,
                },
                credited,
            )
        };
        if credited {
            self.persist(Slice::Record).await;
        }
        stats
    }

    /// Empties the record. An open session keeps its clock and lands in the fresh record.
    pub async fn daily_reset(&self) {
        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.record.clear();
        }
        log::info!("dwell record reset");
        self.persist(Slice::Record).await;
    }

    pub async fn clear(&self) {
        self.daily_reset().await;
    }

    /// Credits the open session one last time, then stops accepting mutations.
    pub async fn teardown(&self) {
        let now = (self.now_provider)();
        let credited = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state.checkpoint_session(now)
        };
        if credited {
            self.persist(Slice::Record).await;
        }
        let mut state = self.state.lock().await;
        state.torn_down = true;
        state.session = None;
    }

    /// Writes the current value of the requested keys. The snapshot is taken under the
    /// persist lock so the last completed write always carries the newest state.
    async fn persist(&self, slice: Slice) {
        let _guard = self.persist_lock.lock().await;
        let entries = {
            let state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            let mut entries = StateEntries::new();
            if matches!(slice, Slice::Record | Slice::Both) {
                match serde_json::to_value(&state.record) {
                    Ok(record) => {
                        entries.insert(KEY_TRACKING_DATA.to_string(), record);
                    }
                    Err(error) => log::warn!("failed to encode dwell record: {error}"),
                }
            }
            if matches!(slice, Slice::Flag | Slice::Both) {
                entries.insert(KEY_IS_TRACKING.to_string(), Value::Bool(state.tracking));
            }
            entries
        };
        if let Err(error) = self.store.set(entries).await {
            log::warn!("failed to persist tracking state: {error}");
        }
    }
}
