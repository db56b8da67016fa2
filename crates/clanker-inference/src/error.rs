use thiserror::Error;

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Api(String),

    #[error("model {0} is not available on the inference backend")]
    ModelUnavailable(String),

    #[error("request timed out")]
    Timeout,

    #[error("inference service is unavailable")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, InferenceError>;
