use std::sync::Arc;

use clanker_memory::store::Store;
use tokio::sync::{watch, Mutex};
use tracing::warn;

const FLUSH_INTERVAL_SECS: u64 = 60;

/// In-process counter/gauge buffer, flushed into the metrics table on a
/// timer. Best-effort: a write failure is logged and the sample dropped,
/// never panics the process.
pub struct MetricsBuffer<S: Store> {
    store: Arc<S>,
    pending: Mutex<Vec<(String, String, f64)>>,
}

impl<S: Store + 'static> MetricsBuffer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store, pending: Mutex::new(Vec::new()) }
    }

    pub async fn record(&self, channel: impl Into<String>, metric_type: impl Into<String>, value: f64) {
        self.pending.lock().await.push((channel.into(), metric_type.into(), value));
    }

    async fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        for (channel, metric_type, value) in batch {
            if let Err(e) = self.store.record_metric(&channel, &metric_type, value).await {
                warn!(error = %e, metric = metric_type, channel, "failed to flush metric, dropping sample");
            }
        }
    }

    /// Flushes every 60s until `shutdown` broadcasts `true`, then flushes once more.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(FLUSH_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.flush().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.flush().await;
                        break;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clanker_memory::store::SqliteStore;

    #[tokio::test]
    async fn record_then_flush_writes_through_store() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let buf = MetricsBuffer::new(store.clone());
        buf.record("system", "process_memory_mb", 128.0).await;
        buf.flush().await;
        assert!(buf.pending.lock().await.is_empty());
    }
}
