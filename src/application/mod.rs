pub mod background;
pub mod block_sync;
pub mod bootstrap;
pub mod commands;
pub mod event_monitor;
pub mod time_accountant;

use chrono::{DateTime, Utc};
use std::sync::Arc;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
