use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("circuit breaker open, retry after {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("database is in read-only failure mode")]
    ReadOnly,

    #[error("database is fully unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, MemoryError>;
