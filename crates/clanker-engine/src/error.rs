use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(String),

    #[error("inference error: {0}")]
    Inference(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
