pub mod blocking_port;
pub mod calendar_port;
pub mod config;
pub mod error;
pub mod event_mapper;
pub mod google_calendar_client;
pub mod presenter;
pub mod state_store;
pub mod storage;
