use thiserror::Error;

/// Errors raised by the Twitch transport.
#[derive(Debug, Error)]
pub enum IrcError {
    /// The underlying connection could not be established or was lost.
    #[error("transport connection failed: {0}")]
    Transport(String),

    /// The transport reported we are banned/forbidden from a specific channel.
    #[error("banned from channel {channel}: {reason}")]
    Banned { channel: String, reason: String },

    /// A message could not be delivered.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Credentials could not be obtained or refreshed.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A chat command was issued by a user lacking broadcaster/moderator badges.
    #[error("unauthorized: requires moderator or broadcaster")]
    Unauthorized,

    /// A chat command's argument failed validation.
    #[error("invalid argument: {0}")]
    CommandValidation(String),
}

pub type Result<T> = std::result::Result<T, IrcError>;
