use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use twitch_irc::login::{RefreshingLoginCredentials, TokenStorage, UserAccessToken};
use twitch_irc::message::ServerMessage;
use twitch_irc::{ClientConfig, SecureTCPTransport, TwitchIRCClient};

use clanker_auth::TokenService;
use clanker_core::ports::{ConfigInvalidator, Emitter, IncomingChat, IngestSink, ModerationEvent};
use clanker_filter::ContentFilter;
use clanker_memory::store::Store;

use crate::commands::{self, CommandContext};
use crate::error::{IrcError, Result};
use crate::reconnect::{is_ban_indicator, ReconnectState};
use crate::types::ConnectionState;

/// Roster of common service bots whose chat lines are never treated as
/// user messages (alongside the bot's own configured username).
const KNOWN_SERVICE_BOTS: &[&str] = &[
    "nightbot",
    "streamlabs",
    "streamelements",
    "moobot",
    "wizebot",
    "soundalerts",
    "commanderroot",
    "fossabot",
];

type TwitchClient = TwitchIRCClient<SecureTCPTransport, RefreshingLoginCredentials<AuthTokenStorage>>;

/// Bridges [`TokenStorage`] (required by `twitch-irc`'s refreshing
/// credentials) onto the `clanker-auth` token collaborator.
#[derive(Clone)]
pub struct AuthTokenStorage {
    pub auth: Arc<dyn TokenService>,
}

#[async_trait]
impl TokenStorage for AuthTokenStorage {
    type LoadError = IrcErrorWrapper;
    type UpdateError = IrcErrorWrapper;

    async fn load_token(&mut self) -> std::result::Result<UserAccessToken, Self::LoadError> {
        let access_token = self.auth.ensure_valid_token().await.map_err(IrcErrorWrapper)?;
        Ok(UserAccessToken {
            access_token,
            refresh_token: String::new(),
            created_at: chrono::Utc::now(),
            expires_at: None,
        })
    }

    async fn update_token(&mut self, _token: &UserAccessToken) -> std::result::Result<(), Self::UpdateError> {
        // Refresh is handled inside `clanker-auth` itself; nothing to persist here.
        Ok(())
    }
}

#[derive(Debug)]
pub struct IrcErrorWrapper(clanker_auth::AuthError);

impl std::fmt::Display for IrcErrorWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for IrcErrorWrapper {}

pub struct TransportConfig {
    pub bot_username: String,
    pub channels: Vec<String>,
    pub max_reconnect_attempts: u32,
}

/// Owns the live connection to Twitch chat: joins configured channels, feeds
/// parsed events to an [`IngestSink`], dispatches `!clank` operator commands,
/// and applies the egress filter before every outbound send.
pub struct Transport<ST: Store> {
    config: TransportConfig,
    store: Arc<ST>,
    filter: Arc<ContentFilter>,
    inference: Arc<clanker_inference::OllamaClient>,
    sink: Arc<dyn IngestSink>,
    invalidator: Arc<dyn ConfigInvalidator>,
    state: tokio::sync::Mutex<ConnectionState>,
    client: tokio::sync::Mutex<Option<TwitchClient>>,
}

impl<ST: Store + 'static> Transport<ST> {
    pub fn new(
        config: TransportConfig,
        store: Arc<ST>,
        filter: Arc<ContentFilter>,
        inference: Arc<clanker_inference::OllamaClient>,
        sink: Arc<dyn IngestSink>,
        invalidator: Arc<dyn ConfigInvalidator>,
    ) -> Self {
        Self {
            config,
            store,
            filter,
            inference,
            sink,
            invalidator,
            state: tokio::sync::Mutex::new(ConnectionState::Disconnected),
            client: tokio::sync::Mutex::new(None),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.lock().await
    }

    /// Drive the connection forever: connect, join, process messages; on
    /// disconnect or fatal error, reconnect with backoff, honoring the
    /// banned-channel quarantine.
    pub async fn run(self: Arc<Self>, auth: Arc<dyn TokenService>) -> Result<()> {
        let mut reconnect = ReconnectState::new();
        loop {
            *self.state.lock().await = ConnectionState::Connecting;
            match self.connect_and_serve(auth.clone(), &mut reconnect).await {
                Ok(()) => {
                    // serve() only returns on a clean, caller-requested stop.
                    return Ok(());
                }
                Err(e) => {
                    warn!(error = %e, "transport disconnected, will reconnect");
                    if let IrcError::Banned { channel, .. } = &e {
                        reconnect.ban(channel);
                    }
                }
            }

            let reinstated = reconnect.reinstate_expired();
            for channel in reinstated {
                info!(channel, "ban retry delay elapsed, reinstating channel");
            }

            let targets = reconnect.target_channels(&self.config.channels);
            if targets.is_empty() {
                warn!("every configured channel is currently banned, reinstating all");
                reconnect.reinstate_all();
            }

            if self.config.max_reconnect_attempts != 0 {
                let attempt = reconnect.next_attempt();
                if attempt > self.config.max_reconnect_attempts {
                    *self.state.lock().await = ConnectionState::Failed;
                    return Err(IrcError::Transport("max reconnect attempts exceeded".to_string()));
                }
            }
            let attempt = reconnect.next_attempt();
            *self.state.lock().await = ConnectionState::Reconnecting;
            let delay = crate::reconnect::backoff_delay(attempt);
            tokio::time::sleep(delay).await;
        }
    }

    async fn connect_and_serve(&self, auth: Arc<dyn TokenService>, reconnect: &mut ReconnectState) -> Result<()> {
        let bot_username = self.config.bot_username.clone();
        let storage = AuthTokenStorage { auth };
        let credentials = RefreshingLoginCredentials::new(bot_username.clone(), String::new(), String::new(), storage);
        let client_config = ClientConfig::new_simple(credentials);
        let (mut incoming, client): (_, TwitchClient) = TwitchIRCClient::new(client_config);

        for channel in reconnect.target_channels(&self.config.channels) {
            client
                .join(channel.to_string())
                .map_err(|e| IrcError::Transport(e.to_string()))?;
        }
        *self.state.lock().await = ConnectionState::Connected;
        *self.client.lock().await = Some(client);
        reconnect.on_connected();
        info!(channels = ?self.config.channels, "connected to twitch chat");

        let mut channel_senders: HashMap<String, mpsc::Sender<IncomingChat>> = HashMap::new();

        while let Some(message) = incoming.recv().await {
            if let Err(e) = self.dispatch(message, &mut channel_senders).await {
                if let IrcError::Banned { .. } = e {
                    return Err(e);
                }
                warn!(error = %e, "error handling inbound message");
            }
        }

        Ok(())
    }

    async fn dispatch(
        &self,
        message: ServerMessage,
        channel_senders: &mut HashMap<String, mpsc::Sender<IncomingChat>>,
    ) -> Result<()> {
        match message {
            ServerMessage::Privmsg(privmsg) => {
                let channel = privmsg.channel_login.clone();
                let username = privmsg.sender.login.clone();

                if username == self.config.bot_username || KNOWN_SERVICE_BOTS.contains(&username.as_str()) {
                    return Ok(());
                }

                let is_broadcaster = privmsg.badges.iter().any(|b| b.name == "broadcaster");
                let is_moderator = privmsg.badges.iter().any(|b| b.name == "moderator");
                let content = privmsg.message_text.clone();

                if content.trim_start().starts_with("!clank") {
                    self.handle_command(&channel, &username, is_broadcaster, is_moderator, &content).await;
                    return Ok(());
                }

                let mention_payload = detect_mention(&self.config.bot_username, &content).map(str::to_string);
                let is_mention = mention_payload.is_some();
                let chat = IncomingChat {
                    channel: channel.clone(),
                    username,
                    text: content,
                    message_id: privmsg.message_id.clone(),
                    is_broadcaster,
                    is_moderator,
                    is_mention,
                    mention_payload,
                };

                let sender = channel_senders
                    .entry(channel.clone())
                    .or_insert_with(|| spawn_channel_worker(channel.clone(), self.sink.clone()));
                let _ = sender.send(chat).await;
            }
            ServerMessage::ClearMsg(clear) => {
                self.sink
                    .on_moderation(ModerationEvent::MessageDeleted {
                        channel: clear.channel_login.clone(),
                        target_msg_id: Some(clear.message_id.clone()),
                    })
                    .await;
            }
            ServerMessage::ClearChat(clear) => {
                let event = match &clear.action {
                    twitch_irc::message::ClearChatAction::UserBanned { user_login, .. }
                    | twitch_irc::message::ClearChatAction::UserTimedOut { user_login, .. } => {
                        ModerationEvent::UserPurged {
                            channel: clear.channel_login.clone(),
                            username: user_login.clone(),
                        }
                    }
                    twitch_irc::message::ClearChatAction::ChatCleared => {
                        ModerationEvent::ChannelCleared { channel: clear.channel_login.clone() }
                    }
                };
                self.sink.on_moderation(event).await;
            }
            ServerMessage::Notice(notice) => {
                if is_ban_indicator(&notice.message_text) {
                    return Err(IrcError::Banned {
                        channel: notice.channel_login.clone().unwrap_or_default(),
                        reason: notice.message_text,
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_command(&self, channel: &str, username: &str, is_broadcaster: bool, is_moderator: bool, content: &str) {
        let args: Vec<&str> = content.trim_start().split_whitespace().skip(1).collect();
        let ctx = CommandContext { channel, username, is_broadcaster, is_moderator, args };
        let reply = match commands::handle(ctx, self.store.as_ref(), &self.inference, self.invalidator.as_ref()).await {
            Ok(reply) => reply,
            Err(IrcError::Unauthorized) => "need moderator or broadcaster".to_string(),
            Err(IrcError::CommandValidation(msg)) => msg,
            Err(e) => {
                error!(error = %e, "command handling failed");
                return;
            }
        };
        self.emit(channel, &reply).await;
    }
}

#[async_trait]
impl<ST: Store + 'static> Emitter for Transport<ST> {
    /// Apply the egress filter and deliver to chat; dropped silently (logged) on a block.
    async fn emit(&self, channel: &str, text: &str) {
        let Some(clean) = self.filter.filter_output(text) else {
            info!(channel, "egress filter blocked outbound message");
            return;
        };
        let guard = self.client.lock().await;
        match guard.as_ref() {
            Some(client) => {
                if let Err(e) = client.say(channel.to_string(), clean).await {
                    warn!(channel, error = %e, "failed to send message");
                }
            }
            None => warn!(channel, "emit called while disconnected"),
        }
    }
}

/// Mention detection: `@botname` or `botname` at the start, followed by
/// end-of-string or a non-word character. Returns the mention payload with
/// one leading punctuation character optionally stripped.
pub fn detect_mention<'a>(bot_username: &str, content: &'a str) -> Option<&'a str> {
    let lowered = content.trim().to_lowercase();
    let bot_lower = bot_username.to_lowercase();

    let rest_start = if let Some(r) = lowered.strip_prefix(&format!("@{bot_lower}")) {
        content.trim().len() - r.len()
    } else if let Some(r) = lowered.strip_prefix(&bot_lower) {
        content.trim().len() - r.len()
    } else {
        return None;
    };

    let trimmed = content.trim();
    let boundary_ok = trimmed[rest_start..]
        .chars()
        .next()
        .map(|c| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(true);
    if !boundary_ok {
        return None;
    }

    let mut payload = trimmed[rest_start..].trim_start();
    if let Some(first) = payload.chars().next() {
        if matches!(first, ':' | ',' | '!' | '?' | '.') {
            payload = &payload[first.len_utf8()..];
        }
    }
    Some(payload.trim())
}

fn spawn_channel_worker(channel: String, sink: Arc<dyn IngestSink>) -> mpsc::Sender<IncomingChat> {
    let (tx, mut rx) = mpsc::channel::<IncomingChat>(256);
    tokio::spawn(async move {
        while let Some(chat) = rx.recv().await {
            sink.on_message(chat).await;
        }
        drop(channel);
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_at_mention() {
        let payload = detect_mention("clankerbot", "@clankerbot: how are you").unwrap();
        assert_eq!(payload, "how are you");
    }

    #[test]
    fn detects_bare_mention_with_boundary() {
        let payload = detect_mention("clankerbot", "clankerbot what's up").unwrap();
        assert_eq!(payload, "what's up");
    }

    #[test]
    fn rejects_prefix_without_boundary() {
        assert!(detect_mention("clanker", "clankerbot hello").is_none());
    }

    #[test]
    fn non_mention_returns_none() {
        assert!(detect_mention("clankerbot", "hello everyone").is_none());
    }
}
