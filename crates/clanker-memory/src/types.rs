use std::fmt;
use std::str::FromStr;

/// Connection health as tracked by the resilience wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Healthy,
    Degraded,
    Failed,
    Recovering,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Failed => write!(f, "failed"),
            Self::Recovering => write!(f, "recovering"),
        }
    }
}

/// Degree to which the store can still serve requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    ReadOnly,
    WriteOnly,
    FullFailure,
}

impl FailureMode {
    /// Classify a database error by matching its rendered text, mirroring the
    /// original implementation's string-based classification (SQLite errors
    /// don't carry a structured "read-only" variant to match on).
    pub fn classify(err: &rusqlite::Error) -> Self {
        let text = err.to_string().to_lowercase();
        if text.contains("readonly") || text.contains("read-only") {
            FailureMode::ReadOnly
        } else if text.contains("database is locked") {
            FailureMode::WriteOnly
        } else if text.contains("disk full") || text.contains("no space") {
            FailureMode::FullFailure
        } else {
            FailureMode::FullFailure
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read_only"),
            Self::WriteOnly => write!(f, "write_only"),
            Self::FullFailure => write!(f, "full_failure"),
        }
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read_only" => Ok(Self::ReadOnly),
            "write_only" => Ok(Self::WriteOnly),
            "full_failure" => Ok(Self::FullFailure),
            other => Err(format!("unknown failure mode: {other}")),
        }
    }
}
