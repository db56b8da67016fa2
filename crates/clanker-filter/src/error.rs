use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("failed to read blocklist file {path}: {source}")]
    BlocklistRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pattern on line {line}: {reason}")]
    InvalidPattern { line: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, FilterError>;
