use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("Upstream fetch failed: {0}")]
    UpstreamFetchFailed(String),
    #[error("Storage write failed: {0}")]
    StorageWriteFailed(String),
    #[error("Site already blocked: {0}")]
    AlreadyBlocked(String),
    #[error("Blocking primitive unavailable")]
    BlockingPrimitiveUnavailable,
    #[error("Blocking call failed: {0}")]
    BlockingCallFailed(String),
    #[error("Host context invalidated")]
    HostContextInvalidated,
}
