use crate::domain::block_plan::{build_rules, effective_sites, tabs_to_redirect, tabs_to_reload};
use crate::domain::sites::normalize_site_input;
use crate::infrastructure::blocking_port::{BlockingPort, BrowserTabs};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::state_store::{
    decode_or_default, StateEntries, StateStore, KEY_BLOCKED_SITES, KEY_BLOCKER_ENABLED,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockingMode {
    Rules,
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileOutcome {
    pub mode: BlockingMode,
    pub removed_rules: usize,
    pub installed_rules: usize,
    pub reloaded_tabs: Vec<i64>,
    pub redirected_tabs: Vec<i64>,
}

impl ReconcileOutcome {
    fn empty(mode: BlockingMode) -> Self {
        Self {
            mode,
            removed_rules: 0,
            installed_rules: 0,
            reloaded_tabs: Vec::new(),
            redirected_tabs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockSettings {
    pub sites: Vec<String>,
    pub enabled: bool,
}

#[derive(Debug, Default)]
struct SyncState {
    desired: Vec<String>,
    enabled: bool,
    /// Sites enforced by the last reconcile.
    applied: Vec<String>,
    torn_down: bool,
}

/// Keeps the installed block rules converged to the desired list and enabled flag.
pub struct BlockRuleSynchronizer {
    store: Arc<dyn StateStore>,
    blocking: Arc<dyn BlockingPort>,
    tabs: Arc<dyn BrowserTabs>,
    blocked_page_url: String,
    state: Mutex<SyncState>,
    reconcile_lock: Mutex<()>,
    persist_lock: Mutex<()>,
}

impl BlockRuleSynchronizer {
    pub fn new(
        store: Arc<dyn StateStore>,
        blocking: Arc<dyn BlockingPort>,
        tabs: Arc<dyn BrowserTabs>,
        blocked_page_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            blocking,
            tabs,
            blocked_page_url: blocked_page_url.into(),
            state: Mutex::new(SyncState::default()),
            reconcile_lock: Mutex::new(()),
            persist_lock: Mutex::new(()),
        }
    }

    pub async fn settings(&self) -> BlockSettings {
        let state = self.state.lock().await;
        BlockSettings {
            sites: state.desired.clone(),
            enabled: state.enabled,
        }
    }

    /// Loads the stored settings and enforces them when the blocker was left on.
    pub async fn hydrate(&self) {
        if !self.load_from_store().await {
            return;
        }
        let settings = self.settings().await;
        if settings.enabled && !settings.sites.is_empty() {
            self.reconcile().await;
        }
    }

    /// Re-reads the stored settings, which another window may have edited, and reconciles.
    pub async fn refresh_from_store(&self) -> ReconcileOutcome {
        self.load_from_store().await;
        self.reconcile().await
    }

    /// Replaces the list. Entries are normalized like user input; blanks and
    /// duplicates are dropped.
    pub async fn set_desired(&self, sites: Vec<String>) -> ReconcileOutcome {
        let mut normalized: Vec<String> = Vec::with_capacity(sites.len());
        for site in sites.iter().filter_map(|site| normalize_site_input(site)) {
            if !normalized.contains(&site) {
                normalized.push(site);
            }
        }
        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return ReconcileOutcome::empty(self.mode());
            }
            state.desired = normalized;
        }
        self.persist().await;
        self.reconcile().await
    }

    pub async fn set_enabled(&self, enabled: bool) -> ReconcileOutcome {
        {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return ReconcileOutcome::empty(self.mode());
            }
            state.enabled = enabled;
        }
        log::info!("blocker {}", if enabled { "enabled" } else { "disabled" });
        self.persist().await;
        self.reconcile().await
    }

    /// Normalizes and appends a site. Returns the updated list.
    pub async fn add_blocked_site(&self, input: &str) -> Result<Vec<String>, InfraError> {
        let site = normalize_site_input(input)
            .ok_or_else(|| InfraError::InvalidUrl(format!("'{input}' is not a site")))?;
        let sites = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return Err(InfraError::HostContextInvalidated);
            }
            if state.desired.contains(&site) {
                return Err(InfraError::AlreadyBlocked(site));
            }
            state.desired.push(site);
            state.desired.clone()
        };
        self.persist().await;
        self.reconcile().await;
        Ok(sites)
    }

    /// Removes a site if present. Returns the updated list.
    pub async fn remove_blocked_site(&self, site: &str) -> Result<Vec<String>, InfraError> {
        let site = normalize_site_input(site).unwrap_or_default();
        let sites = {
            let mut state = self.state.lock().await;
            if state.torn_down {
                return Err(InfraError::HostContextInvalidated);
            }
            state.desired.retain(|existing| *existing != site);
            state.desired.clone()
        };
        self.persist().await;
        self.reconcile().await;
        Ok(sites)
    }

    /// Converges the blocking primitive, or the open pages in fallback mode, to the
    /// current settings. Failures are logged and left for the next call to repair.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        let _reconcile = self.reconcile_lock.lock().await;
        let mode = self.mode();
        let (desired, enabled, previous) = {
            let state = self.state.lock().await;
            if state.torn_down {
                return ReconcileOutcome::empty(mode);
            }
            (state.desired.clone(), state.enabled, state.applied.clone())
        };
        let next = effective_sites(&desired, enabled);

        let outcome = match mode {
            BlockingMode::Rules => self.reconcile_rules(&desired, enabled, &previous, &next).await,
            BlockingMode::Redirect => self.redirect_open_pages(&next).await,
        };

        let mut state = self.state.lock().await;
        if !state.torn_down {
            state.applied = next;
        }
        log::debug!(
            "reconciled blocker: mode={mode:?} removed={} installed={} reloaded={} redirected={}",
            outcome.removed_rules,
            outcome.installed_rules,
            outcome.reloaded_tabs.len(),
            outcome.redirected_tabs.len()
        );
        outcome
    }

    fn mode(&self) -> BlockingMode {
        if self.blocking.rules_available() {
            BlockingMode::Rules
        } else {
            BlockingMode::Redirect
        }
    }

    async fn reconcile_rules(
        &self,
        desired: &[String],
        enabled: bool,
        previous: &[String],
        next: &[String],
    ) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::empty(BlockingMode::Rules);

        let active = match self.blocking.active_rules().await {
            Ok(active) => active,
            Err(error) => {
                log::warn!("failed to read active block rules: {error}");
                Vec::new()
            }
        };
        if !active.is_empty() {
            let ids = active.iter().map(|rule| rule.id).collect::<Vec<_>>();
            match self.blocking.remove_rules(ids).await {
                Ok(()) => outcome.removed_rules = active.len(),
                Err(error) => log::warn!("failed to remove block rules: {error}"),
            }
        }

        if self.is_torn_down().await {
            return outcome;
        }

        let rules = build_rules(desired, enabled);
        if !rules.is_empty() {
            let count = rules.len();
            match self.blocking.install_rules(rules).await {
                Ok(()) => outcome.installed_rules = count,
                Err(error) => log::warn!("failed to install block rules: {error}"),
            }
        }

        if previous.is_empty() || self.is_torn_down().await {
            return outcome;
        }
        let tabs = match self.tabs.list_tabs().await {
            Ok(tabs) => tabs,
            Err(error) => {
                log::warn!("failed to list tabs for reload: {error}");
                return outcome;
            }
        };
        for tab_id in tabs_to_reload(&tabs, previous, next) {
            match self.tabs.reload(tab_id).await {
                Ok(()) => outcome.reloaded_tabs.push(tab_id),
                Err(error) => log::warn!("failed to reload tab {tab_id}: {error}"),
            }
        }
        outcome
    }

    async fn redirect_open_pages(&self, next: &[String]) -> ReconcileOutcome {
        let mut outcome = ReconcileOutcome::empty(BlockingMode::Redirect);
        if next.is_empty() {
            return outcome;
        }
        let tabs = match self.tabs.list_tabs().await {
            Ok(tabs) => tabs,
            Err(error) => {
                log::warn!("failed to list tabs for redirect: {error}");
                return outcome;
            }
        };
        for tab_id in tabs_to_redirect(&tabs, next, &self.blocked_page_url) {
            match self.tabs.redirect(tab_id, &self.blocked_page_url).await {
                Ok(()) => outcome.redirected_tabs.push(tab_id),
                Err(error) => log::warn!("failed to redirect tab {tab_id}: {error}"),
            }
        }
        outcome
    }

    pub async fn teardown(&self) {
        self.state.lock().await.torn_down = true;
    }

    async fn is_torn_down(&self) -> bool {
        self.state.lock().await.torn_down
    }

    /// Returns `false` when the store could not be read.
    async fn load_from_store(&self) -> bool {
        let loaded = match self.store.get(&[KEY_BLOCKED_SITES, KEY_BLOCKER_ENABLED]).await {
            Ok(loaded) => loaded,
            Err(error) => {
                log::warn!("failed to load block settings: {error}");
                return false;
            }
        };
        let mut state = self.state.lock().await;
        if state.torn_down {
            return false;
        }
        state.desired = decode_or_default(&loaded, KEY_BLOCKED_SITES);
        state.enabled = decode_or_default(&loaded, KEY_BLOCKER_ENABLED);
        true
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let entries = {
            let state = self.state.lock().await;
            if state.torn_down {
                return;
            }
            let mut entries = StateEntries::new();
            entries.insert(
                KEY_BLOCKED_SITES.to_string(),
                Value::Array(state.desired.iter().cloned().map(Value::String).collect()),
            );
            entries.insert(KEY_BLOCKER_ENABLED.to_string(), Value::Bool(state.enabled));
            entries
        };
        if let Err(error) = self.store.set(entries).await {
            log::warn!("failed to persist block settings: {error}");
        }
    }
}
