use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clanker_core::types::{GenerationType, Message};
use clanker_memory::store::Store;
use tokio::sync::Mutex;

use crate::error::{EngineError, Result};

const CACHE_TTL: Duration = Duration::from_secs(30);
const MIN_CONTENT_LEN: usize = 3;
const DIVERSITY_CAP: usize = 20;
const DIVERSITY_PER_USER_FLOOR: usize = 10;

const IGNORED_INTERJECTIONS: &[&str] = &["lol", "lul", "kek", "omg", "wtf"];

fn is_noise(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.len() < MIN_CONTENT_LEN {
        return true;
    }
    IGNORED_INTERJECTIONS.contains(&trimmed.to_lowercase().as_str())
}

/// Backward walk keeping the first occurrence (in reverse order) of each
/// user, plus up to `DIVERSITY_PER_USER_FLOOR` repeats, capped at
/// `DIVERSITY_CAP` total, then restored to chronological order.
fn diversity_pass(messages: Vec<Message>) -> Vec<Message> {
    if messages.len() <= DIVERSITY_CAP {
        return messages;
    }
    let mut seen_users = std::collections::HashSet::new();
    let mut selected = Vec::new();
    for msg in messages.into_iter().rev() {
        if selected.len() >= DIVERSITY_CAP {
            break;
        }
        if !seen_users.contains(&msg.username) || selected.len() < DIVERSITY_PER_USER_FLOOR {
            seen_users.insert(msg.username.clone());
            selected.push(msg);
        }
    }
    selected.reverse();
    selected
}

struct CacheEntry {
    built_at: Instant,
    messages: Vec<Message>,
}

/// Produces ordered transcript slices for prompt assembly, cached per
/// `(channel, generation_type)` with a short TTL and moderation-driven
/// invalidation.
pub struct ContextManager<S: Store> {
    store: Arc<S>,
    cache: Mutex<HashMap<(String, GenerationType), CacheEntry>>,
}

impl<S: Store> ContextManager<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, cache: Mutex::new(HashMap::new()) }
    }

    fn effective_limit(context_limit: u32, generation_type: GenerationType) -> u32 {
        match generation_type {
            GenerationType::Spontaneous => context_limit,
            GenerationType::MentionResponse => std::cmp::max(15, (context_limit as f64 * 0.75).floor() as u32),
        }
    }

    pub async fn build(&self, channel: &str, context_limit: u32, generation_type: GenerationType) -> Result<Vec<Message>> {
        let key = (channel.to_string(), generation_type);
        {
            let guard = self.cache.lock().await;
            if let Some(entry) = guard.get(&key) {
                if entry.built_at.elapsed() < CACHE_TTL {
                    return Ok(entry.messages.clone());
                }
            }
        }

        let limit = Self::effective_limit(context_limit, generation_type);
        let raw = self
            .store
            .get_recent_messages(channel, limit)
            .await
            .map_err(|e| EngineError::Store(e.to_string()))?;

        let mut filtered: Vec<Message> = raw.into_iter().filter(|m| !is_noise(&m.content)).collect();
        if generation_type == GenerationType::Spontaneous {
            filtered = diversity_pass(filtered);
        }

        let mut guard = self.cache.lock().await;
        guard.insert(key, CacheEntry { built_at: Instant::now(), messages: filtered.clone() });
        Ok(filtered)
    }

    /// Invalidate both generation-type slices for `channel` (both survive
    /// under the same key space, one remove per `GenerationType`).
    pub async fn invalidate_channel(&self, channel: &str) {
        let mut guard = self.cache.lock().await;
        guard.remove(&(channel.to_string(), GenerationType::Spontaneous));
        guard.remove(&(channel.to_string(), GenerationType::MentionResponse));
    }

    /// Periodic sweep: drop every entry whose TTL has elapsed.
    pub async fn sweep_expired(&self) {
        let mut guard = self.cache.lock().await;
        guard.retain(|_, entry| entry.built_at.elapsed() < CACHE_TTL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clanker_memory::store::SqliteStore;

    #[tokio::test]
    async fn filters_short_and_interjection_messages() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.store_message("chan", "u1", "hi", "id-1", false, false).await.unwrap();
        store.store_message("chan", "u2", "lol", "id-2", false, false).await.unwrap();
        store.store_message("chan", "u3", "a real message here", "id-3", false, false).await.unwrap();

        let manager = ContextManager::new(store);
        let slice = manager.build("chan", 200, GenerationType::Spontaneous).await.unwrap();
        assert_eq!(slice.len(), 1);
        assert_eq!(slice[0].content, "a real message here");
    }

    #[tokio::test]
    async fn diversity_pass_caps_at_twenty_with_per_user_floor() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        for i in 0..30 {
            let user = format!("user{}", i % 3);
            store.store_message("chan", &user, &format!("message number {i}"), &format!("id-{i}"), false, false).await.unwrap();
        }

        let manager = ContextManager::new(store);
        let slice = manager.build("chan", 200, GenerationType::Spontaneous).await.unwrap();
        assert!(slice.len() <= DIVERSITY_CAP);
        // chronological order preserved
        for w in slice.windows(2) {
            assert!(w[0].id < w[1].id);
        }
    }

    #[tokio::test]
    async fn cache_returns_same_slice_within_ttl() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.store_message("chan", "u1", "a real message", "id-1", false, false).await.unwrap();
        let manager = ContextManager::new(store.clone());

        let first = manager.build("chan", 200, GenerationType::Spontaneous).await.unwrap();
        store.store_message("chan", "u2", "a second message", "id-2", false, false).await.unwrap();
        let second = manager.build("chan", 200, GenerationType::Spontaneous).await.unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[tokio::test]
    async fn invalidate_forces_rebuild() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.store_message("chan", "u1", "a real message", "id-1", false, false).await.unwrap();
        let manager = ContextManager::new(store.clone());

        manager.build("chan", 200, GenerationType::Spontaneous).await.unwrap();
        store.store_message("chan", "u2", "a second message", "id-2", false, false).await.unwrap();
        manager.invalidate_channel("chan").await;

        let rebuilt = manager.build("chan", 200, GenerationType::Spontaneous).await.unwrap();
        assert_eq!(rebuilt.len(), 2);
    }
}
