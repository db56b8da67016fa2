use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A chat message observed on a channel, as stored in the transcript table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    /// The platform's own message identifier (Twitch's `target-msg-id` /
    /// tags `id`), used both for dedup on ingest and as the key CLEARMSG
    /// moderation events delete by.
    pub message_id: String,
    pub channel: String,
    pub username: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub is_bot_message: bool,
    pub is_mention: bool,
}

/// Per-channel trigger configuration, cached write-through by the memory gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    pub channel: String,
    pub message_threshold: u32,
    pub spontaneous_cooldown_secs: i64,
    pub response_cooldown_secs: i64,
    pub context_limit: u32,
    /// Per-channel model override. Empty means "use the global default model".
    pub model: String,
    pub message_count: u32,
    pub last_spontaneous_at: Option<DateTime<Utc>>,
}

impl ChannelConfig {
    pub fn defaults_for(channel: &str) -> Self {
        Self {
            channel: channel.to_string(),
            message_threshold: 30,
            spontaneous_cooldown_secs: 300,
            response_cooldown_secs: 60,
            context_limit: 200,
            model: String::new(),
            message_count: 0,
            last_spontaneous_at: None,
        }
    }

    /// Resolve the model to use: the per-channel override if set, otherwise `global_default`.
    pub fn effective_model<'a>(&'a self, global_default: &'a str) -> &'a str {
        if self.model.is_empty() {
            global_default
        } else {
            &self.model
        }
    }

    /// `max(15, floor(0.75 * context_limit))` per the mention-response window rule.
    pub fn response_context_limit(&self) -> u32 {
        std::cmp::max(15, (self.context_limit as f64 * 0.75).floor() as u32)
    }
}

/// Per-user, per-channel mention-response cooldown tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponseCooldown {
    pub channel: String,
    pub username: String,
    pub last_response_at: DateTime<Utc>,
}

/// A persisted OAuth token pair for the Twitch bot account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub id: i64,
    pub access_token_encrypted: Vec<u8>,
    pub refresh_token_encrypted: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub bot_username: String,
    pub updated_at: DateTime<Utc>,
}

/// One sample written to the metrics table by the resource monitor / engine.
/// `channel` is `"system"` for process-wide gauges that aren't scoped to a
/// single channel (memory, disk, CPU).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub id: i64,
    pub channel: String,
    pub metric_type: String,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Why a spontaneous or mention-response generation was (or wasn't) attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerationType {
    Spontaneous,
    MentionResponse,
}

impl std::fmt::Display for GenerationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationType::Spontaneous => write!(f, "spontaneous"),
            GenerationType::MentionResponse => write!(f, "mention_response"),
        }
    }
}

/// Internal event record used to invalidate context-window caches and drive
/// the generation coordinator. Not persisted directly — derived from a
/// [`Message`] plus the filter/trigger decisions made about it.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    pub event_id: Uuid,
    pub channel: String,
    pub username: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    pub is_mention: bool,
    pub is_command: bool,
}

impl MessageEvent {
    pub fn new(channel: &str, username: &str, content: &str, is_mention: bool) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            channel: channel.to_string(),
            username: username.to_string(),
            content: content.to_string(),
            received_at: Utc::now(),
            is_mention,
            is_command: content.trim_start().starts_with("!clank"),
        }
    }
}
