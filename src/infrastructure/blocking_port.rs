use crate::domain::models::{BlockRule, TabInfo};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Native rule-install primitive of the host browser.
#[async_trait]
pub trait BlockingPort: Send + Sync {
    /// `false` selects the tab-redirect fallback.
    fn rules_available(&self) -> bool;
    async fn active_rules(&self) -> Result<Vec<BlockRule>, InfraError>;
    async fn install_rules(&self, rules: Vec<BlockRule>) -> Result<(), InfraError>;
    async fn remove_rules(&self, rule_ids: Vec<u32>) -> Result<(), InfraError>;
}

#[async_trait]
pub trait BrowserTabs: Send + Sync {
    async fn active_tab(&self) -> Result<Option<TabInfo>, InfraError>;
    async fn list_tabs(&self) -> Result<Vec<TabInfo>, InfraError>;
    async fn reload(&self, tab_id: i64) -> Result<(), InfraError>;
    async fn redirect(&self, tab_id: i64, url: &str) -> Result<(), InfraError>;
}

fn poisoned(error: impl std::fmt::Display) -> InfraError {
    InfraError::BlockingCallFailed(format!("blocking port lock poisoned: {error}"))
}

#[derive(Debug, Default)]
struct RuleTable {
    rules: Vec<BlockRule>,
    install_calls: usize,
    remove_calls: usize,
}

/// Rule table held in memory. Installing an id that is already present fails,
/// mirroring the browser primitive.
#[derive(Debug)]
pub struct InMemoryBlockingPort {
    available: bool,
    table: Mutex<RuleTable>,
    fail_install: AtomicBool,
    fail_remove: AtomicBool,
}

impl Default for InMemoryBlockingPort {
    fn default() -> Self {
        Self::new(true)
    }
}

impl InMemoryBlockingPort {
    pub fn new(available: bool) -> Self {
        Self {
            available,
            table: Mutex::new(RuleTable::default()),
            fail_install: AtomicBool::new(false),
            fail_remove: AtomicBool::new(false),
        }
    }

    pub fn set_fail_install(&self, fail: bool) {
        self.fail_install.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_remove(&self, fail: bool) {
        self.fail_remove.store(fail, Ordering::SeqCst);
    }

    pub fn rules(&self) -> Result<Vec<BlockRule>, InfraError> {
        Ok(self.table.lock().map_err(poisoned)?.rules.clone())
    }

    /// `(install, remove)` call counts.
    pub fn call_counts(&self) -> Result<(usize, usize), InfraError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok((table.install_calls, table.remove_calls))
    }
}

#[async_trait]
impl BlockingPort for InMemoryBlockingPort {
    fn rules_available(&self) -> bool {
        self.available
    }

    async fn active_rules(&self) -> Result<Vec<BlockRule>, InfraError> {
        if !self.available {
            return Err(InfraError::BlockingPrimitiveUnavailable);
        }
        self.rules()
    }

    async fn install_rules(&self, rules: Vec<BlockRule>) -> Result<(), InfraError> {
        if !self.available {
            return Err(InfraError::BlockingPrimitiveUnavailable);
        }
        let mut table = self.table.lock().map_err(poisoned)?;
        table.install_calls += 1;
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(InfraError::BlockingCallFailed("install rejected".to_string()));
        }
        if let Some(duplicate) = rules
            .iter()
            .find(|rule| table.rules.iter().any(|existing| existing.id == rule.id))
        {
            return Err(InfraError::BlockingCallFailed(format!(
                "rule id {} already installed",
                duplicate.id
            )));
        }
        table.rules.extend(rules);
        Ok(())
    }

    async fn remove_rules(&self, rule_ids: Vec<u32>) -> Result<(), InfraError> {
        if !self.available {
            return Err(InfraError::BlockingPrimitiveUnavailable);
        }
        let mut table = self.table.lock().map_err(poisoned)?;
        table.remove_calls += 1;
        if self.fail_remove.load(Ordering::SeqCst) {
            return Err(InfraError::BlockingCallFailed("remove rejected".to_string()));
        }
        table.rules.retain(|rule| !rule_ids.contains(&rule.id));
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabAction {
    Reloaded(i64),
    Redirected(i64, String),
}

#[derive(Debug, Default)]
struct TabTable {
    tabs: Vec<TabInfo>,
    active: Option<i64>,
    actions: Vec<TabAction>,
}

/// Open pages plus a log of every reload/redirect applied to them.
#[derive(Debug, Default)]
pub struct InMemoryBrowserTabs {
    table: Mutex<TabTable>,
}

impl InMemoryBrowserTabs {
    pub fn with_tabs(tabs: Vec<TabInfo>, active: Option<i64>) -> Self {
        Self {
            table: Mutex::new(TabTable {
                tabs,
                active,
                actions: Vec::new(),
            }),
        }
    }

    pub fn set_tabs(&self, tabs: Vec<TabInfo>, active: Option<i64>) -> Result<(), InfraError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        table.tabs = tabs;
        table.active = active;
        Ok(())
    }

    pub fn actions(&self) -> Result<Vec<TabAction>, InfraError> {
        Ok(self.table.lock().map_err(poisoned)?.actions.clone())
    }
}

#[async_trait]
impl BrowserTabs for InMemoryBrowserTabs {
    async fn active_tab(&self) -> Result<Option<TabInfo>, InfraError> {
        let table = self.table.lock().map_err(poisoned)?;
        Ok(table
            .active
            .and_then(|active| table.tabs.iter().find(|tab| tab.id == active).cloned()))
    }

    async fn list_tabs(&self) -> Result<Vec<TabInfo>, InfraError> {
        Ok(self.table.lock().map_err(poisoned)?.tabs.clone())
    }

    async fn reload(&self, tab_id: i64) -> Result<(), InfraError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        if !table.tabs.iter().any(|tab| tab.id == tab_id) {
            return Err(InfraError::BlockingCallFailed(format!("no tab with id {tab_id}")));
        }
        table.actions.push(TabAction::Reloaded(tab_id));
        Ok(())
    }

    async fn redirect(&self, tab_id: i64, url: &str) -> Result<(), InfraError> {
        let mut table = self.table.lock().map_err(poisoned)?;
        let Some(tab) = table.tabs.iter_mut().find(|tab| tab.id == tab_id) else {
            return Err(InfraError::BlockingCallFailed(format!("no tab with id {tab_id}")));
        };
        tab.url = Some(url.to_string());
        table.actions.push(TabAction::Redirected(tab_id, url.to_string()));
        Ok(())
    }
}
