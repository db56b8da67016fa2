use std::sync::Arc;

use clanker_core::ports::{Emitter, IncomingChat, IngestSink, ModerationEvent};
use clanker_core::types::GenerationType;
use clanker_filter::ContentFilter;
use clanker_inference::OllamaClient;
use clanker_memory::store::Store;
use tracing::{info, warn};

use crate::context::ContextManager;
use crate::trigger::{ConfigCache, TriggerEngine};

/// Top-level orchestrator: applies the ingress filter, stores the message,
/// evaluates the spontaneous/mention triggers, and runs the matching
/// generation pipeline. Commands are intercepted by the transport before
/// any of this is reached.
pub struct Coordinator<ST: Store> {
    store: Arc<ST>,
    filter: Arc<ContentFilter>,
    inference: Arc<OllamaClient>,
    trigger: TriggerEngine<ST>,
    context: ContextManager<ST>,
    config: Arc<ConfigCache<ST>>,
    emitter: Arc<dyn Emitter>,
    default_model: String,
}

impl<ST: Store + 'static> Coordinator<ST> {
    pub fn new(
        store: Arc<ST>,
        filter: Arc<ContentFilter>,
        inference: Arc<OllamaClient>,
        emitter: Arc<dyn Emitter>,
        default_model: String,
    ) -> Self {
        let config = Arc::new(ConfigCache::new(store.clone()));
        let trigger = TriggerEngine::new(store.clone(), config.clone());
        let context = ContextManager::new(store.clone());
        Self { store, filter, inference, trigger, context, config, emitter, default_model }
    }

    /// The config-cache invalidation hook, handed to the transport so operator
    /// commands that write `ChannelConfig` directly through the store can
    /// evict the coordinator's stale cached copy.
    pub fn config_invalidator(&self) -> Arc<dyn clanker_core::ports::ConfigInvalidator> {
        self.config.clone()
    }

    async fn ingest(&self, msg: IncomingChat) {
        let Some(clean) = self.filter.filter_input(&msg.text) else {
            return;
        };

        let stored = match self
            .store
            .store_message(&msg.channel, &msg.username, &clean, &msg.message_id, false, msg.is_mention)
            .await
        {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, channel = msg.channel, "failed to store message, skipping");
                return;
            }
        };
        let _ = stored;

        if !msg.is_mention {
            if let Err(e) = self.trigger.increment_message_count(&msg.channel).await {
                warn!(error = %e, "failed to increment message count");
            }
        }

        if msg.is_mention {
            match self.trigger.can_respond_to_mention(&msg.channel, &msg.username).await {
                Ok(true) => self.run_response_pipeline(&msg).await,
                Ok(false) => {}
                Err(e) => warn!(error = %e, "mention trigger evaluation failed"),
            }
            return;
        }

        match self.trigger.should_generate_spontaneous(&msg.channel).await {
            Ok(true) => self.run_spontaneous_pipeline(&msg.channel).await,
            Ok(false) => {}
            Err(e) => warn!(error = %e, "spontaneous trigger evaluation failed"),
        }
    }

    async fn run_response_pipeline(&self, msg: &IncomingChat) {
        let config = match self.config.get(&msg.channel).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to load channel config");
                return;
            }
        };
        let model = config.effective_model(&self.default_model).to_string();

        let context = match self
            .context
            .build(&msg.channel, config.context_limit, GenerationType::MentionResponse)
            .await
        {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to build response context");
                return;
            }
        };

        let payload = msg.mention_payload.as_deref().unwrap_or(&msg.text);
        let prompt = clanker_inference::prompt::mention_response_prompt(&msg.channel, &msg.username, payload, &context);
        let reply = self.inference.generate_with_fallback(&model, &prompt).await;
        if reply == "no message" {
            return;
        }

        let Some(clean_reply) = self.filter.filter_output(&reply) else {
            info!(channel = msg.channel, "egress filter blocked mention response");
            return;
        };

        self.emitter.emit(&msg.channel, &clean_reply).await;
        if let Err(e) = self.trigger.record_response(&msg.channel, &msg.username).await {
            warn!(error = %e, "failed to record response timestamp");
        }
    }

    async fn run_spontaneous_pipeline(&self, channel: &str) {
        let config = match self.config.get(channel).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to load channel config");
                return;
            }
        };
        let model = config.effective_model(&self.default_model).to_string();

        let context = match self.context.build(channel, config.context_limit, GenerationType::Spontaneous).await {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "failed to build spontaneous context");
                return;
            }
        };
        // Adequate-context floor already checked by the trigger; a concurrent
        // moderation clear could still have emptied it since, so re-check.
        if context.is_empty() {
            return;
        }

        let prompt = clanker_inference::prompt::spontaneous_prompt(channel, &context);
        let reply = self.inference.generate_with_fallback(&model, &prompt).await;
        if reply == "no message" {
            return;
        }

        let Some(clean_reply) = self.filter.filter_output(&reply) else {
            info!(channel, "egress filter blocked spontaneous message");
            return;
        };

        self.emitter.emit(channel, &clean_reply).await;
        if let Err(e) = self.trigger.record_spontaneous(channel).await {
            warn!(error = %e, "failed to record spontaneous emission");
        }
    }

    async fn moderate(&self, event: ModerationEvent) {
        match event {
            ModerationEvent::MessageDeleted { channel, target_msg_id } => {
                if let Some(message_id) = target_msg_id {
                    if let Err(e) = self.store.delete_message(&message_id).await {
                        warn!(error = %e, "failed to delete message");
                    }
                }
                self.context.invalidate_channel(&channel).await;
            }
            ModerationEvent::UserPurged { channel, username } => {
                if let Err(e) = self.store.delete_user_messages(&channel, &username).await {
                    warn!(error = %e, "failed to delete user messages");
                }
                self.context.invalidate_channel(&channel).await;
            }
            ModerationEvent::ChannelCleared { channel } => {
                if let Err(e) = self.store.clear_channel(&channel).await {
                    warn!(error = %e, "failed to clear channel");
                }
                if let Err(e) = self.store.reset_message_count(&channel).await {
                    warn!(error = %e, "failed to reset message count");
                }
                self.config.invalidate(&channel).await;
                self.context.invalidate_channel(&channel).await;
            }
        }
    }
}

#[async_trait::async_trait]
impl<ST: Store + 'static> IngestSink for Coordinator<ST> {
    async fn on_message(&self, msg: IncomingChat) {
        self.ingest(msg).await;
    }

    async fn on_moderation(&self, event: ModerationEvent) {
        self.moderate(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clanker_core::types::ChannelConfig;
    use clanker_memory::store::SqliteStore;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    #[derive(Default)]
    struct RecordingEmitter {
        sent: StdMutex<Vec<(String, String)>>,
    }

    #[async_trait::async_trait]
    impl Emitter for RecordingEmitter {
        async fn emit(&self, channel: &str, text: &str) {
            self.sent.lock().unwrap().push((channel.to_string(), text.to_string()));
        }
    }

    fn test_inference() -> Arc<OllamaClient> {
        Arc::new(OllamaClient::new("http://127.0.0.1:0", Duration::from_millis(50)))
    }

    fn test_filter() -> Arc<ContentFilter> {
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), "").unwrap();
        Arc::new(ContentFilter::load(f.path().to_str().unwrap()).unwrap())
    }

    #[tokio::test]
    async fn mention_without_reachable_inference_emits_nothing() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let emitter = Arc::new(RecordingEmitter::default());
        let coordinator =
            Coordinator::new(store, test_filter(), test_inference(), emitter.clone(), "llama3".to_string());

        coordinator
            .on_message(IncomingChat {
                channel: "chan".to_string(),
                username: "alice".to_string(),
                text: "@clankerbot hi".to_string(),
                message_id: "msg-1".to_string(),
                is_broadcaster: false,
                is_moderator: false,
                is_mention: true,
                mention_payload: Some("hi".to_string()),
            })
            .await;

        assert!(emitter.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn non_mention_message_increments_count_and_stores() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let emitter = Arc::new(RecordingEmitter::default());
        let coordinator =
            Coordinator::new(store.clone(), test_filter(), test_inference(), emitter, "llama3".to_string());

        coordinator
            .on_message(IncomingChat {
                channel: "chan".to_string(),
                username: "alice".to_string(),
                text: "just chatting".to_string(),
                message_id: "msg-1".to_string(),
                is_broadcaster: false,
                is_moderator: false,
                is_mention: false,
                mention_payload: None,
            })
            .await;

        let config = store.get_config("chan").await.unwrap();
        assert_eq!(config.message_count, 1);
        let messages = store.get_recent_messages("chan", 10).await.unwrap();
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn channel_clear_resets_count_and_clears_messages() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.store_message("chan", "alice", "hi", "msg-1", false, false).await.unwrap();
        let mut config = ChannelConfig::defaults_for("chan");
        config.message_count = 5;
        store.update_config(&config).await.unwrap();

        let emitter = Arc::new(RecordingEmitter::default());
        let coordinator =
            Coordinator::new(store.clone(), test_filter(), test_inference(), emitter, "llama3".to_string());

        coordinator.on_moderation(ModerationEvent::ChannelCleared { channel: "chan".to_string() }).await;

        assert!(store.get_recent_messages("chan", 10).await.unwrap().is_empty());
        assert_eq!(store.get_config("chan").await.unwrap().message_count, 0);
    }

    #[tokio::test]
    async fn blocked_input_is_never_stored() {
        let f = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(f.path(), "badword\n").unwrap();
        let filter = Arc::new(ContentFilter::load(f.path().to_str().unwrap()).unwrap());

        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let emitter = Arc::new(RecordingEmitter::default());
        let coordinator = Coordinator::new(store.clone(), filter, test_inference(), emitter, "llama3".to_string());

        coordinator
            .on_message(IncomingChat {
                channel: "chan".to_string(),
                username: "alice".to_string(),
                text: "say badword now".to_string(),
                message_id: "msg-1".to_string(),
                is_broadcaster: false,
                is_moderator: false,
                is_mention: false,
                mention_payload: None,
            })
            .await;

        assert!(store.get_recent_messages("chan", 10).await.unwrap().is_empty());
    }
}
