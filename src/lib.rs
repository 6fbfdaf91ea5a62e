pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::commands::{dispatch, AppState, CommandRequest, CommandResponse, HostPorts};
pub use domain::classification::classify;
pub use domain::models::{CalendarEvent, NotificationState};
pub use infrastructure::error::InfraError;
