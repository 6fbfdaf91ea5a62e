use crate::domain::models::NotificationState;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::sync::Mutex;

/// Renders the tier chosen by the event monitor. Called only when the tier changes.
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    async fn render(&self, state: &NotificationState) -> Result<(), InfraError>;
}

/// Logs each change; used when no UI is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogPresenter;

#[async_trait]
impl NotificationPresenter for LogPresenter {
    async fn render(&self, state: &NotificationState) -> Result<(), InfraError> {
        match state.event() {
            Some(event) => log::info!("notification {} for event {}", state.tier_name(), event.id),
            None => log::info!("notification cleared"),
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingPresenter {
    rendered: Mutex<Vec<NotificationState>>,
}

impl RecordingPresenter {
    pub fn rendered(&self) -> Vec<NotificationState> {
        self.rendered
            .lock()
            .map(|rendered| rendered.clone())
            .unwrap_or_default()
    }

    pub fn last(&self) -> Option<NotificationState> {
        self.rendered().pop()
    }
}

#[async_trait]
impl NotificationPresenter for RecordingPresenter {
    async fn render(&self, state: &NotificationState) -> Result<(), InfraError> {
        let mut rendered = self
            .rendered
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("presenter lock poisoned: {error}")))?;
        rendered.push(state.clone());
        Ok(())
    }
}
