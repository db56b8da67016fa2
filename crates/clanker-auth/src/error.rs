use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token service returned an error: {0}")]
    Api(String),

    #[error("token refresh failed after retries: {0}")]
    RefreshFailed(String),

    #[error("token encryption error: {0}")]
    Encryption(String),

    #[error("no token on file; bot has not completed OAuth setup")]
    NotConfigured,

    #[error("persistence error: {0}")]
    Store(String),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http",
            Self::Api(_) => "api",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::Encryption(_) => "encryption",
            Self::NotConfigured => "not_configured",
            Self::Store(_) => "store",
        }
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
