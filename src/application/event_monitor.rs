use crate::application::NowProvider;
use crate::domain::classification::{classify_with, ProximityWindows};
use crate::domain::models::{CalendarEvent, DismissalSet, NotificationState};
use crate::domain::notification::{LifecycleTimings, NotificationLifecycle};
use crate::infrastructure::calendar_port::CalendarPort;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::presenter::NotificationPresenter;
use crate::infrastructure::state_store::{decode_or_default, entries, StateStore, KEY_DISMISSED_EVENTS};
use chrono::{Duration, Utc};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub windows: ProximityWindows,
    pub timings: LifecycleTimings,
    pub lookahead: Duration,
    pub max_events: usize,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            windows: ProximityWindows::default(),
            timings: LifecycleTimings::default(),
            lookahead: Duration::hours(24),
            max_events: 10,
        }
    }
}

#[derive(Debug)]
struct MonitorState {
    events: Vec<CalendarEvent>,
    dismissed: DismissalSet,
    lifecycle: NotificationLifecycle,
    applied_fetch: u64,
    torn_down: bool,
}

/// Decides which calendar event, if any, is surfaced and how urgently.
pub struct EventProximityMonitor {
    calendar: Arc<dyn CalendarPort>,
    store: Arc<dyn StateStore>,
    presenter: Arc<dyn NotificationPresenter>,
    settings: MonitorSettings,
    state: Mutex<MonitorState>,
    /// Serializes tier changes with their rendering so the presenter sees them in order.
    render_lock: Mutex<()>,
    persist_lock: Mutex<()>,
    fetch_sequence: AtomicU64,
    now_provider: NowProvider,
}

impl EventProximityMonitor {
    pub fn new(
        calendar: Arc<dyn CalendarPort>,
        store: Arc<dyn StateStore>,
        presenter: Arc<dyn NotificationPresenter>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            calendar,
            store,
            presenter,
            state: Mutex::new(MonitorState {
                events: Vec::new(),
                dismissed: DismissalSet::new(),
                lifecycle: NotificationLifecycle::new(settings.timings),
                applied_fetch: 0,
                torn_down: false,
            }),
            settings,
            render_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
            fetch_sequence: AtomicU64::new(0),
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub async fn hydrate(&self) {
        let loaded = match self.store.get(&[KEY_DISMISSED_EVENTS]).await {
            Ok(loaded) => loaded,
            Err(error) => {
                log::warn!("failed to load dismissed events: {error}");
                return;
            }
        };
        let stored: BTreeMap<String, bool> = decode_or_default(&loaded, KEY_DISMISSED_EVENTS);
        let mut state = self.state.lock().await;
        if state.torn_down {
            return;
        }
        state
            .dismissed
            .extend(stored.into_iter().filter(|(_, dismissed)| *dismissed).map(|(id, _)| id));
    }

    pub async fn current_state(&self) -> NotificationState {
        self.state.lock().await.lifecycle.state().clone()
    }

    pub async fn dismissed(&self) -> DismissalSet {
        self.state.lock().await.dismissed.clone()
    }

    /// Fetches the lookahead window and reclassifies. A failed fetch counts as an empty list.
    pub async fn poll(&self) {
        let sequence = self.fetch_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let now = (self.now_provider)();
        let events = match self
            .calendar
            .list_events(now, now + self.settings.lookahead)
            .await
        {
            Ok(events) => events,
            Err(error) => {
                log::warn!("event fetch failed, treating as empty: {error}");
                Vec::new()
            }
        };
        self.apply_events(sequence, events).await;
    }

    /// Classifies a list delivered by the calendar collaborator without fetching.
    pub async fn push_events(&self, events: Vec<CalendarEvent>) {
        let sequence = self.fetch_sequence.fetch_add(1, Ordering::SeqCst) + 1;
        self.apply_events(sequence, events).await;
    }

    async fn apply_events(&self, sequence: u64, events: Vec<CalendarEvent>) {
        let _render = self.render_lock.lock().await;
        let now = (self.now_provider)();
        let changed = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            if sequence < state.applied_fetch {
                log::debug!("discarding stale event list {sequence}");
                return;
            }
            state.applied_fetch = sequence;
            state.events = events;
            let next = classify_with(
                &self.settings.windows,
                &state.events,
                &state.dismissed,
                now,
                state.lifecycle.state(),
            );
            state
                .lifecycle
                .transition(next, now)
                .then(|| state.lifecycle.state().clone())
        };
        if let Some(next) = changed {
            self.render(&next).await;
        }
    }

    /// Retires an expired notification between classifications.
    pub async fn tick(&self) {
        let _render = self.render_lock.lock().await;
        let now = (self.now_provider)();
        let changed = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            state
                .lifecycle
                .tick(now)
                .then(|| state.lifecycle.state().clone())
        };
        if let Some(next) = changed {
            self.render(&next).await;
        }
    }

    /// Records the dismissal and hides whatever is showing; the next classification
    /// picks the following candidate.
    pub async fn dismiss_event(&self, event_id: &str) {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            return;
        }
        {
            let _render = self.render_lock.lock().await;
            let now = (self.now_provider)();
            let changed = {
                let mut state = self.state.lock().await;
                if state.torn_down {
                    return;
                }
                state.dismissed.insert(event_id.to_string());
                state.lifecycle.clear(now)
            };
            if changed {
                self.render(&NotificationState::None).await;
            }
        }
        self.persist_dismissed().await;
    }

    /// Hides the current notification without dismissing its event.
    pub async fn close_notification(&self) {
        let _render = self.render_lock.lock().await;
        let now = (self.now_provider)();
        let changed = {
            let mut state = self.state.lock().await;
            !state.torn_down && state.lifecycle.clear(now)
        };
        if changed {
            self.render(&NotificationState::None).await;
        }
    }

    pub async fn pointer_entered(&self) {
        let mut state = self.state.lock().await;
        if !state.torn_down {
            state.lifecycle.pointer_entered();
        }
    }

    pub async fn pointer_left(&self) {
        let now = (self.now_provider)();
        let mut state = self.state.lock().await;
        if !state.torn_down {
            state.lifecycle.pointer_left(now);
        }
    }

    /// Events in the lookahead window, earliest first. Fetch errors are returned.
    pub async fn get_current_events(&self) -> Result<Vec<CalendarEvent>, InfraError> {
        let now = (self.now_provider)();
        let mut events = self
            .calendar
            .list_events(now, now + self.settings.lookahead)
            .await?;
        events.sort_by_key(|event| event.start_at);
        events.truncate(self.settings.max_events);
        Ok(events)
    }

    pub async fn teardown(&self) {
        let mut state = self.state.lock().await;
        state.torn_down = true;
    }

    async fn render(&self, state: &NotificationState) {
        log::debug!("notification tier -> {}", state.tier_name());
        if let Err(error) = self.presenter.render(state).await {
            log::warn!("failed to render notification: {error}");
        }
    }

    async fn persist_dismissed(&self) {
        let _guard = self.persist_lock.lock().await;
        let value = {
            let state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            Value::Object(
                state
                    .dismissed
                    .iter()
                    .map(|id| (id.clone(), Value::Bool(true)))
                    .collect(),
            )
        };
        if let Err(error) = self.store.set(entries([(KEY_DISMISSED_EVENTS, value)])).await {
            log::warn!("failed to persist dismissed events: {error}");
        }
    }
}
