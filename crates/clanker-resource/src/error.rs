use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("store error: {0}")]
    Store(String),

    #[error("probe failed: {0}")]
    Probe(String),
}

pub type Result<T> = std::result::Result<T, ResourceError>;
