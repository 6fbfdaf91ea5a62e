use crate::infrastructure::error::InfraError;
use crate::infrastructure::storage::{initialize_database, open_connection};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const KEY_TRACKING_DATA: &str = "trackingData";
pub const KEY_IS_TRACKING: &str = "isTracking";
pub const KEY_DISMISSED_EVENTS: &str = "dismissedEvents";
pub const KEY_BLOCKED_SITES: &str = "blockedSites";
pub const KEY_BLOCKER_ENABLED: &str = "blockerEnabled";

pub type StateEntries = Map<String, Value>;

/// Durable key/value bridge across restarts. Writers only ever pass their own
/// keys; nothing replaces the whole store.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, keys: &[&str]) -> Result<StateEntries, InfraError>;
    async fn set(&self, entries: StateEntries) -> Result<(), InfraError>;
}

/// Decodes `key` from a fetched snapshot, falling back to the default when the
/// value is absent or has an unexpected shape.
pub fn decode_or_default<T>(entries: &StateEntries, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let Some(value) = entries.get(key) else {
        return T::default();
    };
    match serde_json::from_value(value.clone()) {
        Ok(decoded) => decoded,
        Err(error) => {
            log::warn!("ignoring undecodable stored value for {key}: {error}");
            T::default()
        }
    }
}

pub fn entries<const N: usize>(pairs: [(&str, Value); N]) -> StateEntries {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[derive(Debug, Clone)]
pub struct SqliteStateStore {
    db_path: PathBuf,
}

impl SqliteStateStore {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, InfraError> {
        let db_path = db_path.as_ref().to_path_buf();
        initialize_database(&db_path)?;
        Ok(Self { db_path })
    }

    fn connect(&self) -> Result<Connection, InfraError> {
        open_connection(&self.db_path)
    }

    fn write(&self, entries: &StateEntries) -> Result<(), InfraError> {
        let mut connection = self.connect()?;
        let transaction = connection.transaction()?;
        let updated_at = Utc::now().to_rfc3339();
        for (key, value) in entries {
            transaction.execute(
                "INSERT INTO kv_state (key, value, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   updated_at = excluded.updated_at",
                params![key, serde_json::to_string(value)?, updated_at],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, keys: &[&str]) -> Result<StateEntries, InfraError> {
        let connection = self.connect()?;
        let mut found = StateEntries::new();
        for key in keys {
            let raw: Option<String> = connection
                .query_row(
                    "SELECT value FROM kv_state WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(raw) = raw else {
                continue;
            };
            match serde_json::from_str::<Value>(&raw) {
                Ok(value) => {
                    found.insert((*key).to_string(), value);
                }
                Err(error) => log::warn!("stored value for {key} is not valid JSON: {error}"),
            }
        }
        Ok(found)
    }

    async fn set(&self, entries: StateEntries) -> Result<(), InfraError> {
        self.write(&entries)
            .map_err(|error| InfraError::StorageWriteFailed(error.to_string()))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStateStore {
    values: Mutex<StateEntries>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStateStore {
    pub fn with_entries(initial: StateEntries) -> Self {
        Self {
            values: Mutex::new(initial),
            ..Self::default()
        }
    }

    /// Number of successful `set` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> Result<StateEntries, InfraError> {
        let values = self
            .values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("state store lock poisoned: {error}")))?;
        Ok(values.clone())
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn get(&self, keys: &[&str]) -> Result<StateEntries, InfraError> {
        let values = self
            .values
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("state store lock poisoned: {error}")))?;
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| ((*key).to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, entries: StateEntries) -> Result<(), InfraError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(InfraError::StorageWriteFailed(
                "in-memory store configured to fail".to_string(),
            ));
        }
        let mut values = self
            .values
            .lock()
            .map_err(|error| InfraError::StorageWriteFailed(format!("state store lock poisoned: {error}")))?;
        values.extend(entries);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
