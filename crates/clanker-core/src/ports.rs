use async_trait::async_trait;

/// Runtime connection state of the chat transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// A chat line received over the transport, with IRCv3 tag fields the rest
/// of the system cares about already extracted.
#[derive(Debug, Clone)]
pub struct IncomingChat {
    pub channel: String,
    pub username: String,
    pub text: String,
    /// The platform's own id for this line (Twitch tags `id`), carried
    /// through to storage so a duplicate delivery doesn't double-insert.
    pub message_id: String,
    pub is_broadcaster: bool,
    pub is_moderator: bool,
    pub is_mention: bool,
    /// The mention payload (text with the bot's name stripped), set when `is_mention`.
    pub mention_payload: Option<String>,
}

/// A moderation action observed on the transport (CLEARMSG / CLEARCHAT).
#[derive(Debug, Clone)]
pub enum ModerationEvent {
    MessageDeleted { channel: String, target_msg_id: Option<String> },
    UserPurged { channel: String, username: String },
    ChannelCleared { channel: String },
}

/// Destination for parsed inbound transport events, implemented by the
/// generation coordinator. Kept here (not in the transport crate) so neither
/// side of the ingest boundary depends on the other's crate.
#[async_trait]
pub trait IngestSink: Send + Sync {
    async fn on_message(&self, msg: IncomingChat);
    async fn on_moderation(&self, event: ModerationEvent);
}

/// Outbound delivery capability the coordinator calls back into, implemented
/// by the transport. Applies the egress filter and sends, or drops silently.
#[async_trait]
pub trait Emitter: Send + Sync {
    async fn emit(&self, channel: &str, text: &str);
}

/// Invalidation hook for the coordinator's in-process `ChannelConfig` cache,
/// implemented by the engine and called by the transport's command handler
/// after an operator command writes a new config directly through the
/// store. Without this, the coordinator's cache could keep serving a stale
/// config until its own TTL or moderation-driven invalidation fired.
#[async_trait]
pub trait ConfigInvalidator: Send + Sync {
    async fn invalidate_config(&self, channel: &str);
}
