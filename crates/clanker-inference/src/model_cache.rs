use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const TTL: Duration = Duration::from_secs(5 * 60);

/// Caches `GET /api/tags` lookups per model name for 5 minutes, including
/// negative results, so a misconfigured `model` config value doesn't cause a
/// tags round-trip on every single generation.
#[derive(Default)]
pub struct ModelCache {
    entries: Mutex<HashMap<String, (bool, Instant)>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, model: &str) -> Option<bool> {
        let entries = self.entries.lock().unwrap();
        entries.get(model).and_then(|(available, at)| {
            if at.elapsed() < TTL {
                Some(*available)
            } else {
                None
            }
        })
    }

    pub fn set(&self, model: &str, available: bool) {
        self.entries
            .lock()
            .unwrap()
            .insert(model.to_string(), (available, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_positive_and_negative_results() {
        let cache = ModelCache::new();
        assert_eq!(cache.get("llama3"), None);

        cache.set("llama3", true);
        assert_eq!(cache.get("llama3"), Some(true));

        cache.set("missing-model", false);
        assert_eq!(cache.get("missing-model"), Some(false));
    }
}
