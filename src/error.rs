use thiserror::Error;

/// Everything that can stop a collection invocation, or a single job within it.
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid data from remote server: {0}")]
    Data(String),

    #[error("Failed to fetch logs: {0}")]
    Fetch(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl CollectError {
    /// Whether re-invoking the whole collection could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, CollectError::Configuration(_) | CollectError::Auth(_))
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value is invalid: {0}")]
    InvalidValue(String),
}
