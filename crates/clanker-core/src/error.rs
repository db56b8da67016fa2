use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClankerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("persistence error: {0}")]
    Memory(String),

    #[error("inference error: {0}")]
    Inference(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("content filter error: {0}")]
    Filter(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClankerError {
    /// Short machine-readable code, mirrored in log fields and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            ClankerError::Config(_) => "CONFIG_ERROR",
            ClankerError::Memory(_) => "MEMORY_ERROR",
            ClankerError::Inference(_) => "INFERENCE_ERROR",
            ClankerError::Transport(_) => "TRANSPORT_ERROR",
            ClankerError::Filter(_) => "FILTER_ERROR",
            ClankerError::Auth(_) => "AUTH_ERROR",
            ClankerError::Serialization(_) => "SERIALIZATION_ERROR",
            ClankerError::Io(_) => "IO_ERROR",
            ClankerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClankerError>;
