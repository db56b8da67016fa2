use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use clanker_core::types::ChannelConfig;
use clanker_memory::store::Store;
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};

/// Adequate-context floor for the spontaneous trigger: at least this many
/// messages must have been seen in the channel in the last 24h.
const SPONTANEOUS_CONTEXT_FLOOR: u64 = 10;

/// In-process cache of `ChannelConfig`, guarded by a single mutex so every
/// mutating call writes through to the store under the same critical
/// section the cache update happens in.
pub struct ConfigCache<S: Store> {
    store: Arc<S>,
    cache: Mutex<HashMap<String, ChannelConfig>>,
}

impl<S: Store> ConfigCache<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, cache: Mutex::new(HashMap::new()) }
    }

    pub async fn get(&self, channel: &str) -> Result<ChannelConfig> {
        let mut guard = self.cache.lock().await;
        if let Some(config) = guard.get(channel) {
            return Ok(config.clone());
        }
        let config = self.store.get_config(channel).await.map_err(|e| EngineError::Store(e.to_string()))?;
        guard.insert(channel.to_string(), config.clone());
        Ok(config)
    }

    /// Write `config` through to the store and the cache under one lock.
    pub async fn update(&self, config: ChannelConfig) -> Result<()> {
        let mut guard = self.cache.lock().await;
        self.store.update_config(&config).await.map_err(|e| EngineError::Store(e.to_string()))?;
        guard.insert(config.channel.clone(), config);
        Ok(())
    }

    /// Drop a cached entry, forcing the next `get` to re-read the store.
    /// Used after an out-of-band write (an operator command applied
    /// directly through the store rather than through this cache).
    pub async fn invalidate(&self, channel: &str) {
        self.cache.lock().await.remove(channel);
    }
}

#[async_trait::async_trait]
impl<S: Store> clanker_core::ports::ConfigInvalidator for ConfigCache<S> {
    async fn invalidate_config(&self, channel: &str) {
        self.invalidate(channel).await;
    }
}

/// Evaluates the spontaneous and mention triggers and records generation
/// outcomes, per-channel, against persisted counters and cooldowns.
pub struct TriggerEngine<S: Store> {
    store: Arc<S>,
    config: Arc<ConfigCache<S>>,
}

impl<S: Store> TriggerEngine<S> {
    pub fn new(store: Arc<S>, config: Arc<ConfigCache<S>>) -> Self {
        Self { store, config }
    }

    pub async fn should_generate_spontaneous(&self, channel: &str) -> Result<bool> {
        let config = self.config.get(channel).await?;

        if config.message_count < config.message_threshold {
            return Ok(false);
        }

        if let Some(last) = config.last_spontaneous_at {
            let elapsed = (Utc::now() - last).num_seconds();
            if elapsed < config.spontaneous_cooldown_secs {
                return Ok(false);
            }
        }

        let since = Utc::now() - chrono::Duration::hours(24);
        let recent = self
            .store
            .count_recent_messages(channel, since)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;
        Ok(recent >= SPONTANEOUS_CONTEXT_FLOOR)
    }

    pub async fn can_respond_to_mention(&self, channel: &str, username: &str) -> Result<bool> {
        let config = self.config.get(channel).await?;
        match self
            .store
            .get_user_last_response(channel, username)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?
        {
            None => Ok(true),
            Some(last) => Ok((Utc::now() - last).num_seconds() >= config.response_cooldown_secs),
        }
    }

    /// Increment the per-channel message count. Call only for ingested,
    /// filter-passing, non-mention, non-command messages, after storage.
    pub async fn increment_message_count(&self, channel: &str) -> Result<()> {
        self.store.increment_message_count(channel).await.map_err(|e| EngineError::Store(e.to_string()))?;
        self.config.invalidate(channel).await;
        Ok(())
    }

    /// Record a spontaneous emission: reset the counter and stamp the timestamp.
    pub async fn record_spontaneous(&self, channel: &str) -> Result<()> {
        self.store.reset_message_count(channel).await.map_err(|e| EngineError::Store(e.to_string()))?;
        self.store
            .update_spontaneous_timestamp(channel, Utc::now())
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;
        self.config.invalidate(channel).await;
        Ok(())
    }

    /// Record a mention-response emission for `(channel, username)`.
    pub async fn record_response(&self, channel: &str, username: &str) -> Result<()> {
        self.store
            .update_user_response_timestamp(channel, username, Utc::now())
            .await
            .map_err(|e| EngineError::Store(e.to_string()))
    }
}
