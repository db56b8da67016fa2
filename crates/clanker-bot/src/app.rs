use std::sync::Arc;

use arc_swap::ArcSwapOption;
use clanker_auth::{TokenService, TwitchTokenService};
use clanker_core::config::ClankerConfig;
use clanker_core::error::{ClankerError, Result};
use clanker_core::ports::Emitter;
use clanker_engine::Coordinator;
use clanker_filter::ContentFilter;
use clanker_inference::OllamaClient;
use clanker_irc::{Transport, TransportConfig};
use clanker_memory::store::SqliteStore;
use clanker_memory::ResilientStore;
use clanker_resource::{MetricsBuffer, ResourceMonitor};
use tokio::sync::watch;

type BotStore = ResilientStore<SqliteStore>;

/// Every long-lived component the bot wires together, plus the shutdown
/// broadcaster every background task watches.
pub struct AppState {
    pub transport: Arc<Transport<BotStore>>,
    pub auth: Arc<dyn TokenService>,
    pub resource: Arc<ResourceMonitor<BotStore>>,
    pub metrics: Arc<MetricsBuffer<BotStore>>,
    pub shutdown_tx: watch::Sender<bool>,
}

impl AppState {
    pub async fn new(config: &ClankerConfig) -> Result<Self> {
        let store = match config.database.kind.as_str() {
            "sqlite" => SqliteStore::open(&config.database.connection).map_err(|e| ClankerError::Memory(e.to_string()))?,
            other => {
                return Err(ClankerError::Config(format!(
                    "unsupported database kind {other:?}, only sqlite is implemented"
                )))
            }
        };
        let store = Arc::new(ResilientStore::new(store));

        let filter = Arc::new(
            ContentFilter::load(&config.filter.blocklist_path).map_err(|e| ClankerError::Filter(e.to_string()))?,
        );

        let inference = Arc::new(OllamaClient::new(
            &config.inference.base_url,
            std::time::Duration::from_millis(config.inference.timeout_ms),
        ));

        let encryption_key = resolve_encryption_key(&config.token_service.encryption_key_env)?;
        let auth: Arc<dyn TokenService> = Arc::new(TwitchTokenService::new(
            store.clone(),
            config.token_service.client_id.clone().unwrap_or_default(),
            config.token_service.client_secret.clone().unwrap_or_default(),
            encryption_key,
        ));

        auth.ensure_valid_token().await.map_err(|e| {
            ClankerError::Auth(format!("no usable Twitch token on startup ({e}); run the OAuth bootstrap first"))
        })?;
        let bot_username = auth.get_bot_username().await.map_err(|e| ClankerError::Auth(e.to_string()))?;

        // Transport and Coordinator each need the other (Coordinator is the
        // transport's ingest sink; the transport is the coordinator's
        // emitter), so the emitter is indirected through a swappable slot
        // until the transport exists to fill it in.
        let emitter_slot: Arc<EmitterSlot> = Arc::new(EmitterSlot::default());
        let emitter_for_coordinator: Arc<dyn Emitter> = emitter_slot.clone();
        let coordinator = Arc::new(Coordinator::new(
            store.clone(),
            filter.clone(),
            inference.clone(),
            emitter_for_coordinator,
            config.inference.default_model.clone(),
        ));

        let transport_config =
            TransportConfig { bot_username, channels: config.channels.names.clone(), max_reconnect_attempts: 0 };
        let transport = Arc::new(Transport::new(
            transport_config,
            store.clone(),
            filter,
            inference,
            coordinator.clone(),
            coordinator.config_invalidator(),
        ));
        let transport_as_emitter: Arc<dyn Emitter> = transport.clone();
        emitter_slot.0.store(Some(transport_as_emitter));

        let metrics = Arc::new(MetricsBuffer::new(store.clone()));
        let resource = Arc::new(ResourceMonitor::new(
            store,
            metrics.clone(),
            config.resource.clone(),
            config.retention.clone(),
        ));

        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self { transport, auth, resource, metrics, shutdown_tx })
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }
}

fn resolve_encryption_key(env_var: &str) -> Result<[u8; 32]> {
    let raw = std::env::var(env_var)
        .map_err(|_| ClankerError::Config(format!("{env_var} is not set; required to encrypt stored tokens")))?;
    Ok(clanker_auth::crypto::key_from_str(&raw))
}

/// Forwards to whatever emitter is installed, or drops with a warning if
/// none has been wired yet.
#[derive(Default)]
struct EmitterSlot(ArcSwapOption<dyn Emitter>);

#[async_trait::async_trait]
impl Emitter for EmitterSlot {
    async fn emit(&self, channel: &str, text: &str) {
        if let Some(emitter) = self.0.load_full() {
            emitter.emit(channel, text).await;
        } else {
            tracing::warn!("emit called before transport was wired, dropping message");
        }
    }
}
