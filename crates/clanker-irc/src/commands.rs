use clanker_core::ports::ConfigInvalidator;
use clanker_core::types::ChannelConfig;
use clanker_inference::OllamaClient;
use clanker_memory::store::Store;
use tracing::info;

use crate::error::{IrcError, Result};

/// A parsed `!clank ...` invocation, with the issuer's authorization badges
/// already extracted by the caller (transport message parsing).
pub struct CommandContext<'a> {
    pub channel: &'a str,
    pub username: &'a str,
    pub is_broadcaster: bool,
    pub is_moderator: bool,
    pub args: Vec<&'a str>,
}

impl<'a> CommandContext<'a> {
    fn authorized(&self) -> bool {
        self.is_broadcaster || self.is_moderator
    }
}

const HELP_TEXT: &str =
    "!clank [threshold|spontaneous|response|context|model|status] — manage this channel's bot settings";

/// Dispatch a `!clank` command, reading/writing channel config through
/// `store` and validating model names against `inference`. Returns the
/// chat reply to send back.
pub async fn handle<S: Store + ?Sized>(
    ctx: CommandContext<'_>,
    store: &S,
    inference: &OllamaClient,
    invalidator: &dyn ConfigInvalidator,
) -> Result<String> {
    if !ctx.authorized() {
        return Err(IrcError::Unauthorized);
    }

    let mut config = store
        .get_config(ctx.channel)
        .await
        .map_err(|e| IrcError::SendFailed(e.to_string()))?;

    let reply = match ctx.args.first().copied() {
        None => HELP_TEXT.to_string(),
        Some("threshold") => handle_int_setting(
            &ctx,
            &mut config,
            1,
            1000,
            |c| c.message_threshold as i64,
            |c, v| c.message_threshold = v as u32,
            "message_threshold",
        )?,
        Some("spontaneous") => handle_int_setting(
            &ctx,
            &mut config,
            0,
            3600,
            |c| c.spontaneous_cooldown_secs,
            |c, v| c.spontaneous_cooldown_secs = v,
            "spontaneous_cooldown",
        )?,
        Some("response") => handle_int_setting(
            &ctx,
            &mut config,
            0,
            3600,
            |c| c.response_cooldown_secs,
            |c, v| c.response_cooldown_secs = v,
            "response_cooldown",
        )?,
        Some("context") => handle_int_setting(
            &ctx,
            &mut config,
            10,
            1000,
            |c| c.context_limit as i64,
            |c, v| c.context_limit = v as u32,
            "context_limit",
        )?,
        Some("model") => handle_model(&ctx, &mut config, inference).await?,
        Some("status") => {
            return Ok(status_report(&config, inference));
        }
        Some(other) => {
            return Err(IrcError::CommandValidation(format!("unknown subcommand {other}")));
        }
    };

    store
        .update_config(&config)
        .await
        .map_err(|e| IrcError::SendFailed(e.to_string()))?;
    invalidator.invalidate_config(ctx.channel).await;
    info!(channel = ctx.channel, user = ctx.username, "applied clank command");
    Ok(reply)
}

fn handle_int_setting(
    ctx: &CommandContext<'_>,
    config: &mut ChannelConfig,
    min: i64,
    max: i64,
    get: impl Fn(&ChannelConfig) -> i64,
    set: impl Fn(&mut ChannelConfig, i64),
    label: &str,
) -> Result<String> {
    match ctx.args.get(1) {
        None => Ok(format!("{label} is currently {}", get(config))),
        Some(raw) => {
            let value: i64 = raw
                .parse()
                .map_err(|_| IrcError::CommandValidation(format!("{label} must be an integer")))?;
            if value < min || value > max {
                return Err(IrcError::CommandValidation(format!(
                    "{label} must be between {min} and {max}"
                )));
            }
            set(config, value);
            Ok(format!("{label} set to {value}"))
        }
    }
}

async fn handle_model(
    ctx: &CommandContext<'_>,
    config: &mut ChannelConfig,
    inference: &OllamaClient,
) -> Result<String> {
    match ctx.args.get(1) {
        None => Ok(format!("model override is currently {}", config.model)),
        Some(raw) => {
            if matches!(*raw, "default" | "global" | "none" | "") {
                config.model = String::new();
                return Ok("model override cleared".to_string());
            }
            if !raw.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')) {
                return Err(IrcError::CommandValidation(
                    "model name may only contain letters, digits, '.', '_', '-'".to_string(),
                ));
            }
            let exists = inference
                .validate_model(raw)
                .await
                .map_err(|e| IrcError::CommandValidation(format!("could not validate model: {e}")))?;
            if !exists {
                return Err(IrcError::CommandValidation(format!("model {raw} is not available")));
            }
            config.model = raw.to_string();
            Ok(format!("model override set to {raw}"))
        }
    }
}

fn status_report(config: &ChannelConfig, inference: &OllamaClient) -> String {
    format!(
        "inference: {} | model: {} | messages: {}/{}",
        inference.health().state(),
        if config.model.is_empty() { "default" } else { &config.model },
        config.message_count,
        config.message_threshold,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use clanker_memory::store::SqliteStore;

    fn client() -> OllamaClient {
        OllamaClient::new("http://127.0.0.1:0", std::time::Duration::from_secs(1))
    }

    struct NoopInvalidator;

    #[async_trait::async_trait]
    impl ConfigInvalidator for NoopInvalidator {
        async fn invalidate_config(&self, _channel: &str) {}
    }

    #[tokio::test]
    async fn unauthorized_user_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = CommandContext {
            channel: "chan",
            username: "rando",
            is_broadcaster: false,
            is_moderator: false,
            args: vec!["threshold"],
        };
        let result = handle(ctx, &store, &client(), &NoopInvalidator).await;
        assert!(matches!(result, Err(IrcError::Unauthorized)));
    }

    #[tokio::test]
    async fn threshold_show_and_set() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = CommandContext {
            channel: "chan",
            username: "mod1",
            is_broadcaster: false,
            is_moderator: true,
            args: vec!["threshold", "50"],
        };
        let reply = handle(ctx, &store, &client(), &NoopInvalidator).await.unwrap();
        assert!(reply.contains("50"));

        let config = store.get_config("chan").await.unwrap();
        assert_eq!(config.message_threshold, 50);
    }

    #[tokio::test]
    async fn threshold_out_of_range_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = CommandContext {
            channel: "chan",
            username: "mod1",
            is_broadcaster: true,
            is_moderator: false,
            args: vec!["threshold", "5000"],
        };
        let result = handle(ctx, &store, &client(), &NoopInvalidator).await;
        assert!(matches!(result, Err(IrcError::CommandValidation(_))));
    }

    #[tokio::test]
    async fn unknown_subcommand_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let ctx = CommandContext {
            channel: "chan",
            username: "mod1",
            is_broadcaster: true,
            is_moderator: false,
            args: vec!["bogus"],
        };
        let result = handle(ctx, &store, &client(), &NoopInvalidator).await;
        assert!(matches!(result, Err(IrcError::CommandValidation(_))));
    }
}
