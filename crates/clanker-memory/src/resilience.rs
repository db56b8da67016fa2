use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use clanker_core::types::{AuthToken, ChannelConfig, Message};

use crate::error::{MemoryError, Result};
use crate::store::Store;
use crate::types::{ConnectionState, FailureMode};

const MAX_RETRIES: u32 = 5;
const BASE_DELAY: Duration = Duration::from_secs(1);
const MAX_DELAY: Duration = Duration::from_secs(60);
const FAILURE_THRESHOLD: u32 = 3;
const CIRCUIT_BREAKER_THRESHOLD: u32 = 10;
const CIRCUIT_BREAKER_TIMEOUT: Duration = Duration::from_secs(60);
pub const HEALTH_PROBE_INTERVAL: Duration = Duration::from_secs(30);

struct Health {
    connection_state: ConnectionState,
    consecutive_failures: u32,
    circuit_failures: u32,
    circuit_opened_at: Option<Instant>,
    failure_mode: Option<FailureMode>,
}

impl Default for Health {
    fn default() -> Self {
        Self {
            connection_state: ConnectionState::Healthy,
            consecutive_failures: 0,
            circuit_failures: 0,
            circuit_opened_at: None,
            failure_mode: None,
        }
    }
}

/// Decorates any [`Store`] with retry, circuit-breaking, and failure-mode
/// classification, matching `ConnectionHealthMonitor` /
/// `ResilientDatabaseManager` from the original implementation.
pub struct ResilientStore<S: Store> {
    inner: S,
    health: Mutex<Health>,
}

impl<S: Store> ResilientStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            health: Mutex::new(Health::default()),
        }
    }

    fn backoff_delay(retry_count: u32) -> Duration {
        let exp = BASE_DELAY.as_secs_f64() * 2f64.powi(retry_count as i32 - 1);
        let capped = exp.min(MAX_DELAY.as_secs_f64());
        // ±20% jitter derived from the wall clock, matching the teacher's
        // avoidance of an extra `rand` dependency for one-off jitter.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.subsec_nanos())
            .unwrap_or(0);
        let jitter_unit = (nanos % 1000) as f64 / 1000.0; // [0, 1)
        let jitter = 1.0 + (jitter_unit - 0.5) * 0.4; // [0.8, 1.2)
        Duration::from_secs_f64(capped * jitter)
    }

    fn circuit_is_open(&self) -> Option<Duration> {
        let health = self.health.lock().unwrap();
        let opened_at = health.circuit_opened_at?;
        let elapsed = opened_at.elapsed();
        if elapsed < CIRCUIT_BREAKER_TIMEOUT {
            Some(CIRCUIT_BREAKER_TIMEOUT - elapsed)
        } else {
            None
        }
    }

    fn record_success(&self) {
        let mut health = self.health.lock().unwrap();
        health.consecutive_failures = 0;
        health.circuit_failures = 0;
        health.circuit_opened_at = None;
        health.failure_mode = None;
        if health.connection_state != ConnectionState::Healthy {
            info!("store connection recovered");
            health.connection_state = ConnectionState::Healthy;
        }
    }

    fn record_failure(&self, err: &rusqlite::Error) {
        let mode = FailureMode::classify(err);
        let mut health = self.health.lock().unwrap();
        health.consecutive_failures += 1;
        health.circuit_failures += 1;
        health.failure_mode = Some(mode);

        if health.consecutive_failures >= FAILURE_THRESHOLD {
            health.connection_state = ConnectionState::Failed;
        } else {
            health.connection_state = ConnectionState::Degraded;
        }

        if health.circuit_failures >= CIRCUIT_BREAKER_THRESHOLD && health.circuit_opened_at.is_none()
        {
            warn!(failures = health.circuit_failures, "circuit breaker opened");
            health.circuit_opened_at = Some(Instant::now());
        }
    }

    /// Current connection state, for operator `!clank status`.
    pub fn connection_state(&self) -> ConnectionState {
        self.health.lock().unwrap().connection_state
    }

    async fn retrying<R, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<R>
    where
        Fut: Future<Output = std::result::Result<R, MemoryError>>,
    {
        if let Some(remaining) = self.circuit_is_open() {
            return Err(MemoryError::CircuitOpen {
                retry_after_secs: remaining.as_secs(),
            });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Ok(v) => {
                    self.record_success();
                    return Ok(v);
                }
                Err(MemoryError::Database(e)) => {
                    self.record_failure(&e);
                    if attempt >= MAX_RETRIES {
                        error!(attempts = attempt, error = %e, "store operation exhausted retries");
                        return Err(MemoryError::Database(e));
                    }
                    tokio::time::sleep(Self::backoff_delay(attempt)).await;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Background task: probes the store every 30s and drives recovery.
    /// Mirrors `ResilientDatabaseManager._health_monitoring_loop`.
    pub async fn run_health_monitor(self: std::sync::Arc<Self>) {
        let mut interval = tokio::time::interval(HEALTH_PROBE_INTERVAL);
        loop {
            interval.tick().await;
            match self.inner.health_check().await {
                Ok(()) => self.record_success(),
                Err(MemoryError::Database(e)) => {
                    let mut health = self.health.lock().unwrap();
                    health.connection_state = ConnectionState::Recovering;
                    drop(health);
                    warn!(error = %e, "health probe failed, entering recovery");
                }
                Err(_) => {}
            }
        }
    }
}

#[async_trait]
impl<S: Store> Store for ResilientStore<S> {
    async fn store_message(
        &self,
        channel: &str,
        username: &str,
        content: &str,
        message_id: &str,
        is_bot_message: bool,
        is_mention: bool,
    ) -> Result<Message> {
        self.retrying(|| {
            self.inner
                .store_message(channel, username, content, message_id, is_bot_message, is_mention)
        })
        .await
    }

    async fn get_recent_messages(&self, channel: &str, limit: u32) -> Result<Vec<Message>> {
        self.retrying(|| self.inner.get_recent_messages(channel, limit)).await
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.retrying(|| self.inner.delete_message(message_id)).await
    }

    async fn delete_user_messages(&self, channel: &str, username: &str) -> Result<u64> {
        self.retrying(|| self.inner.delete_user_messages(channel, username)).await
    }

    async fn clear_channel(&self, channel: &str) -> Result<u64> {
        self.retrying(|| self.inner.clear_channel(channel)).await
    }

    async fn cleanup_old_messages(&self, retention_days: u32) -> Result<u64> {
        self.retrying(|| self.inner.cleanup_old_messages(retention_days)).await
    }

    async fn count_recent_messages(&self, channel: &str, since: DateTime<Utc>) -> Result<u64> {
        self.retrying(|| self.inner.count_recent_messages(channel, since)).await
    }

    async fn get_config(&self, channel: &str) -> Result<ChannelConfig> {
        self.retrying(|| self.inner.get_config(channel)).await
    }

    async fn update_config(&self, config: &ChannelConfig) -> Result<()> {
        if self.health.lock().unwrap().failure_mode == Some(FailureMode::ReadOnly) {
            return Err(MemoryError::ReadOnly);
        }
        self.retrying(|| self.inner.update_config(config)).await
    }

    async fn increment_message_count(&self, channel: &str) -> Result<u32> {
        if self.health.lock().unwrap().failure_mode == Some(FailureMode::ReadOnly) {
            return Err(MemoryError::ReadOnly);
        }
        self.retrying(|| self.inner.increment_message_count(channel)).await
    }

    async fn reset_message_count(&self, channel: &str) -> Result<()> {
        self.retrying(|| self.inner.reset_message_count(channel)).await
    }

    async fn update_spontaneous_timestamp(&self, channel: &str, ts: DateTime<Utc>) -> Result<()> {
        self.retrying(|| self.inner.update_spontaneous_timestamp(channel, ts)).await
    }

    async fn get_user_last_response(
        &self,
        channel: &str,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.retrying(|| self.inner.get_user_last_response(channel, username)).await
    }

    async fn update_user_response_timestamp(
        &self,
        channel: &str,
        username: &str,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.retrying(|| self.inner.update_user_response_timestamp(channel, username, ts))
            .await
    }

    async fn store_auth_token(&self, token: &AuthToken) -> Result<()> {
        self.retrying(|| self.inner.store_auth_token(token)).await
    }

    async fn get_auth_token(&self) -> Result<Option<AuthToken>> {
        self.retrying(|| self.inner.get_auth_token()).await
    }

    async fn delete_auth_token(&self) -> Result<()> {
        self.retrying(|| self.inner.delete_auth_token()).await
    }

    async fn record_metric(&self, channel: &str, metric_type: &str, value: f64) -> Result<()> {
        self.retrying(|| self.inner.record_metric(channel, metric_type, value)).await
    }

    async fn cleanup_old_metrics(&self, retention_days: u32) -> Result<u64> {
        self.retrying(|| self.inner.cleanup_old_metrics(retention_days)).await
    }

    async fn health_check(&self) -> Result<()> {
        self.inner.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct AlwaysFailsStore {
        calls: AtomicU32,
    }

    #[async_trait]
    impl Store for AlwaysFailsStore {
        async fn store_message(
            &self,
            _channel: &str,
            _username: &str,
            _content: &str,
            _message_id: &str,
            _is_bot_message: bool,
            _is_mention: bool,
        ) -> Result<Message> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(MemoryError::Database(rusqlite::Error::QueryReturnedNoRows))
        }
        async fn get_recent_messages(&self, _channel: &str, _limit: u32) -> Result<Vec<Message>> {
            unimplemented!()
        }
        async fn delete_message(&self, _message_id: &str) -> Result<()> {
            unimplemented!()
        }
        async fn delete_user_messages(&self, _channel: &str, _username: &str) -> Result<u64> {
            unimplemented!()
        }
        async fn clear_channel(&self, _channel: &str) -> Result<u64> {
            unimplemented!()
        }
        async fn cleanup_old_messages(&self, _retention_days: u32) -> Result<u64> {
            unimplemented!()
        }
        async fn count_recent_messages(&self, _channel: &str, _since: DateTime<Utc>) -> Result<u64> {
            unimplemented!()
        }
        async fn get_config(&self, channel: &str) -> Result<ChannelConfig> {
            Ok(ChannelConfig::defaults_for(channel))
        }
        async fn update_config(&self, _config: &ChannelConfig) -> Result<()> {
            unimplemented!()
        }
        async fn increment_message_count(&self, _channel: &str) -> Result<u32> {
            unimplemented!()
        }
        async fn reset_message_count(&self, _channel: &str) -> Result<()> {
            unimplemented!()
        }
        async fn update_spontaneous_timestamp(&self, _channel: &str, _ts: DateTime<Utc>) -> Result<()> {
            unimplemented!()
        }
        async fn get_user_last_response(
            &self,
            _channel: &str,
            _username: &str,
        ) -> Result<Option<DateTime<Utc>>> {
            unimplemented!()
        }
        async fn update_user_response_timestamp(
            &self,
            _channel: &str,
            _username: &str,
            _ts: DateTime<Utc>,
        ) -> Result<()> {
            unimplemented!()
        }
        async fn store_auth_token(&self, _token: &AuthToken) -> Result<()> {
            unimplemented!()
        }
        async fn get_auth_token(&self) -> Result<Option<AuthToken>> {
            unimplemented!()
        }
        async fn delete_auth_token(&self) -> Result<()> {
            unimplemented!()
        }
        async fn record_metric(&self, _channel: &str, _metric_type: &str, _value: f64) -> Result<()> {
            unimplemented!()
        }
        async fn cleanup_old_metrics(&self, _retention_days: u32) -> Result<u64> {
            unimplemented!()
        }
        async fn health_check(&self) -> Result<()> {
            unimplemented!()
        }
    }

    #[test]
    fn backoff_delay_stays_within_jittered_bounds() {
        for attempt in 1..=5 {
            let delay = ResilientStore::<SqliteStoreStub>::backoff_delay(attempt);
            let unjittered = (BASE_DELAY.as_secs_f64() * 2f64.powi(attempt as i32 - 1))
                .min(MAX_DELAY.as_secs_f64());
            assert!(delay.as_secs_f64() >= unjittered * 0.8 - 0.01);
            assert!(delay.as_secs_f64() <= unjittered * 1.2 + 0.01);
        }
    }

    // Zero-sized stand-in just to name a concrete `S` for the associated fn test above.
    struct SqliteStoreStub;
    #[async_trait]
    impl Store for SqliteStoreStub {
        async fn store_message(&self, _: &str, _: &str, _: &str, _: &str, _: bool, _: bool) -> Result<Message> {
            unimplemented!()
        }
        async fn get_recent_messages(&self, _: &str, _: u32) -> Result<Vec<Message>> {
            unimplemented!()
        }
        async fn delete_message(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn delete_user_messages(&self, _: &str, _: &str) -> Result<u64> {
            unimplemented!()
        }
        async fn clear_channel(&self, _: &str) -> Result<u64> {
            unimplemented!()
        }
        async fn cleanup_old_messages(&self, _: u32) -> Result<u64> {
            unimplemented!()
        }
        async fn count_recent_messages(&self, _: &str, _: DateTime<Utc>) -> Result<u64> {
            unimplemented!()
        }
        async fn get_config(&self, channel: &str) -> Result<ChannelConfig> {
            Ok(ChannelConfig::defaults_for(channel))
        }
        async fn update_config(&self, _: &ChannelConfig) -> Result<()> {
            unimplemented!()
        }
        async fn increment_message_count(&self, _: &str) -> Result<u32> {
            unimplemented!()
        }
        async fn reset_message_count(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn update_spontaneous_timestamp(&self, _: &str, _: DateTime<Utc>) -> Result<()> {
            unimplemented!()
        }
        async fn get_user_last_response(&self, _: &str, _: &str) -> Result<Option<DateTime<Utc>>> {
            unimplemented!()
        }
        async fn update_user_response_timestamp(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<()> {
            unimplemented!()
        }
        async fn store_auth_token(&self, _: &AuthToken) -> Result<()> {
            unimplemented!()
        }
        async fn get_auth_token(&self) -> Result<Option<AuthToken>> {
            unimplemented!()
        }
        async fn delete_auth_token(&self) -> Result<()> {
            unimplemented!()
        }
        async fn record_metric(&self, _: &str, _: &str, _: f64) -> Result<()> {
            unimplemented!()
        }
        async fn cleanup_old_metrics(&self, _: u32) -> Result<u64> {
            unimplemented!()
        }
        async fn health_check(&self) -> Result<()> {
            unimplemented!()
        }
    }

    #[tokio::test]
    async fn circuit_breaker_opens_after_threshold_failures() {
        let wrapped = ResilientStore::new(AlwaysFailsStore {
            calls: AtomicU32::new(0),
        });

        // Each call retries MAX_RETRIES times before giving up, so two calls
        // is enough to cross CIRCUIT_BREAKER_THRESHOLD (10) consecutive failures.
        for _ in 0..3 {
            let _ = wrapped.store_message("chan", "u", "hi", "id", false, false).await;
        }

        assert_eq!(wrapped.connection_state(), ConnectionState::Failed);
        let result = wrapped.store_message("chan", "u", "hi", "id", false, false).await;
        assert!(matches!(result, Err(MemoryError::CircuitOpen { .. })));
    }
}
