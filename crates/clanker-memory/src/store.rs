use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

use clanker_core::types::{AuthToken, ChannelConfig, Message};

use crate::db::init_db;
use crate::error::Result;

/// All persistence operations the rest of the system depends on.
///
/// One implementation ([`SqliteStore`]) backs the embedded database; the
/// [`crate::resilience::ResilientStore`] decorator wraps any `Store` with
/// retry, circuit-breaking, and failure-mode classification.
#[async_trait]
pub trait Store: Send + Sync {
    async fn store_message(
        &self,
        channel: &str,
        username: &str,
        content: &str,
        message_id: &str,
        is_bot_message: bool,
        is_mention: bool,
    ) -> Result<Message>;

    async fn get_recent_messages(&self, channel: &str, limit: u32) -> Result<Vec<Message>>;

    async fn delete_message(&self, message_id: &str) -> Result<()>;

    async fn delete_user_messages(&self, channel: &str, username: &str) -> Result<u64>;

    async fn clear_channel(&self, channel: &str) -> Result<u64>;

    async fn cleanup_old_messages(&self, retention_days: u32) -> Result<u64>;

    async fn count_recent_messages(&self, channel: &str, since: DateTime<Utc>) -> Result<u64>;

    async fn get_config(&self, channel: &str) -> Result<ChannelConfig>;

    async fn update_config(&self, config: &ChannelConfig) -> Result<()>;

    async fn increment_message_count(&self, channel: &str) -> Result<u32>;

    async fn reset_message_count(&self, channel: &str) -> Result<()>;

    async fn update_spontaneous_timestamp(&self, channel: &str, ts: DateTime<Utc>) -> Result<()>;

    async fn get_user_last_response(
        &self,
        channel: &str,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>>;

    async fn update_user_response_timestamp(
        &self,
        channel: &str,
        username: &str,
        ts: DateTime<Utc>,
    ) -> Result<()>;

    async fn store_auth_token(&self, token: &AuthToken) -> Result<()>;

    async fn get_auth_token(&self) -> Result<Option<AuthToken>>;

    async fn delete_auth_token(&self) -> Result<()>;

    async fn record_metric(&self, channel: &str, metric_type: &str, value: f64) -> Result<()>;

    async fn cleanup_old_metrics(&self, retention_days: u32) -> Result<u64>;

    /// Cheap liveness probe used by the resilience health monitor.
    async fn health_check(&self) -> Result<()>;
}

/// SQLite-backed [`Store`]. Holds a small fixed-size pool of connections
/// behind a mutex — SQLite serialises writers regardless, so the pool
/// mainly lets concurrent readers avoid queueing behind each other.
pub struct SqliteStore {
    pool: Mutex<Vec<Connection>>,
}

const POOL_SIZE: usize = 5;

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self> {
        let mut conns = Vec::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            let conn = Connection::open(path)?;
            init_db(&conn)?;
            conns.push(conn);
        }
        Ok(Self {
            pool: Mutex::new(conns),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conns = Vec::with_capacity(POOL_SIZE);
        for _ in 0..POOL_SIZE {
            let conn = Connection::open_in_memory()?;
            init_db(&conn)?;
            conns.push(conn);
        }
        Ok(Self {
            pool: Mutex::new(conns),
        })
    }

    /// Check out a connection, run `f`, return it to the pool.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let mut pool = self.pool.lock().unwrap();
        let conn = pool.pop().expect("connection pool exhausted");
        let result = f(&conn);
        pool.push(conn);
        Ok(result?)
    }
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let ts_str: String = row.get(5)?;
    Ok(Message {
        id: row.get(0)?,
        message_id: row.get(1)?,
        channel: row.get(2)?,
        username: row.get(3)?,
        content: row.get(4)?,
        timestamp: ts_str
            .parse()
            .unwrap_or_else(|_| Utc::now()),
        is_bot_message: row.get::<_, i64>(6)? != 0,
        is_mention: row.get::<_, i64>(7)? != 0,
    })
}

#[async_trait]
impl Store for SqliteStore {
    async fn store_message(
        &self,
        channel: &str,
        username: &str,
        content: &str,
        message_id: &str,
        is_bot_message: bool,
        is_mention: bool,
    ) -> Result<Message> {
        let now_str = Utc::now().to_rfc3339();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (message_id, channel, username, content, timestamp, is_bot_message, is_mention)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(message_id) DO NOTHING",
                params![message_id, channel, username, content, now_str, is_bot_message, is_mention],
            )?;
            // A duplicate `message_id` hits the ON CONFLICT no-op above, so
            // this always re-reads the single row that now exists for it —
            // the one just inserted, or the one from the first delivery.
            conn.query_row(
                "SELECT id, message_id, channel, username, content, timestamp, is_bot_message, is_mention
                 FROM messages WHERE message_id = ?1",
                [message_id],
                row_to_message,
            )
        })
    }

    async fn get_recent_messages(&self, channel: &str, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, channel, username, content, timestamp, is_bot_message, is_mention
                 FROM messages WHERE channel = ?1 ORDER BY timestamp DESC LIMIT ?2",
            )?;
            let mut rows = stmt
                .query_map(params![channel, limit], row_to_message)?
                .filter_map(|r| r.ok())
                .collect::<Vec<_>>();
            rows.reverse(); // chronological order
            Ok(rows)
        })
    }

    async fn delete_message(&self, message_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE message_id = ?1", [message_id])?;
            Ok(())
        })
    }

    async fn delete_user_messages(&self, channel: &str, username: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM messages WHERE channel = ?1 AND username = ?2",
                params![channel, username],
            )?;
            Ok(n as u64)
        })
    }

    async fn clear_channel(&self, channel: &str) -> Result<u64> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE channel = ?1", [channel])?;
            Ok(n as u64)
        })
    }

    async fn cleanup_old_messages(&self, retention_days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE timestamp < ?1", [cutoff])?;
            Ok(n as u64)
        })
    }

    async fn count_recent_messages(&self, channel: &str, since: DateTime<Utc>) -> Result<u64> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE channel = ?1 AND timestamp >= ?2",
                params![channel, since.to_rfc3339()],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
        })
    }

    async fn get_config(&self, channel: &str) -> Result<ChannelConfig> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT channel, message_threshold, spontaneous_cooldown_secs,
                            response_cooldown_secs, context_limit, model, message_count,
                            last_spontaneous_at
                     FROM channel_configs WHERE channel = ?1",
                    [channel],
                    |row| {
                        let last: Option<String> = row.get(7)?;
                        Ok(ChannelConfig {
                            channel: row.get(0)?,
                            message_threshold: row.get(1)?,
                            spontaneous_cooldown_secs: row.get(2)?,
                            response_cooldown_secs: row.get(3)?,
                            context_limit: row.get(4)?,
                            model: row.get(5)?,
                            message_count: row.get(6)?,
                            last_spontaneous_at: last.and_then(|s| s.parse().ok()),
                        })
                    },
                )
                .optional()?;
            Ok(row)
        })
        .map(|opt| opt.unwrap_or_else(|| ChannelConfig::defaults_for(channel)))
    }

    async fn update_config(&self, config: &ChannelConfig) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channel_configs
                    (channel, message_threshold, spontaneous_cooldown_secs, response_cooldown_secs,
                     context_limit, model, message_count, last_spontaneous_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(channel) DO UPDATE SET
                    message_threshold = excluded.message_threshold,
                    spontaneous_cooldown_secs = excluded.spontaneous_cooldown_secs,
                    response_cooldown_secs = excluded.response_cooldown_secs,
                    context_limit = excluded.context_limit,
                    model = excluded.model,
                    message_count = excluded.message_count,
                    last_spontaneous_at = excluded.last_spontaneous_at",
                params![
                    config.channel,
                    config.message_threshold,
                    config.spontaneous_cooldown_secs,
                    config.response_cooldown_secs,
                    config.context_limit,
                    config.model,
                    config.message_count,
                    config.last_spontaneous_at.map(|t| t.to_rfc3339()),
                ],
            )?;
            Ok(())
        })
    }

    async fn increment_message_count(&self, channel: &str) -> Result<u32> {
        let config = self.get_config(channel).await?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channel_configs (channel, message_count) VALUES (?1, 1)
                 ON CONFLICT(channel) DO UPDATE SET message_count = message_count + 1",
                [channel],
            )?;
            Ok(config.message_count + 1)
        })
    }

    async fn reset_message_count(&self, channel: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE channel_configs SET message_count = 0 WHERE channel = ?1",
                [channel],
            )?;
            Ok(())
        })
    }

    async fn update_spontaneous_timestamp(&self, channel: &str, ts: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO channel_configs (channel, last_spontaneous_at) VALUES (?1, ?2)
                 ON CONFLICT(channel) DO UPDATE SET last_spontaneous_at = excluded.last_spontaneous_at",
                params![channel, ts.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    async fn get_user_last_response(
        &self,
        channel: &str,
        username: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT last_response_at FROM user_response_cooldowns
                 WHERE channel = ?1 AND username = ?2",
                params![channel, username],
                |row| row.get::<_, String>(0),
            )
            .optional()
        })
        .map(|opt| opt.and_then(|s| s.parse().ok()))
    }

    async fn update_user_response_timestamp(
        &self,
        channel: &str,
        username: &str,
        ts: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_response_cooldowns (channel, username, last_response_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(channel, username) DO UPDATE SET last_response_at = excluded.last_response_at",
                params![channel, username, ts.to_rfc3339()],
            )?;
            Ok(())
        })
    }

    async fn store_auth_token(&self, token: &AuthToken) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auth_tokens
                    (id, access_token_encrypted, refresh_token_encrypted, expires_at, bot_username, updated_at)
                 VALUES (1, ?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    access_token_encrypted = excluded.access_token_encrypted,
                    refresh_token_encrypted = excluded.refresh_token_encrypted,
                    expires_at = excluded.expires_at,
                    bot_username = excluded.bot_username,
                    updated_at = excluded.updated_at",
                params![
                    token.access_token_encrypted,
                    token.refresh_token_encrypted,
                    token.expires_at.to_rfc3339(),
                    token.bot_username,
                    token.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    async fn get_auth_token(&self) -> Result<Option<AuthToken>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, access_token_encrypted, refresh_token_encrypted, expires_at,
                        bot_username, updated_at
                 FROM auth_tokens WHERE id = 1",
                [],
                |row| {
                    let expires: String = row.get(3)?;
                    let updated: String = row.get(5)?;
                    Ok(AuthToken {
                        id: row.get(0)?,
                        access_token_encrypted: row.get(1)?,
                        refresh_token_encrypted: row.get(2)?,
                        expires_at: expires.parse().unwrap_or_else(|_| Utc::now()),
                        bot_username: row.get(4)?,
                        updated_at: updated.parse().unwrap_or_else(|_| Utc::now()),
                    })
                },
            )
            .optional()
        })
    }

    async fn delete_auth_token(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM auth_tokens WHERE id = 1", [])?;
            Ok(())
        })
    }

    async fn record_metric(&self, channel: &str, metric_type: &str, value: f64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO bot_metrics (channel, metric_type, value, recorded_at) VALUES (?1, ?2, ?3, ?4)",
                params![channel, metric_type, value, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    async fn cleanup_old_metrics(&self, retention_days: u32) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(retention_days as i64)).to_rfc3339();
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM bot_metrics WHERE recorded_at < ?1", [cutoff])?;
            Ok(n as u64)
        })
    }

    async fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| conn.query_row("SELECT 1", [], |_| Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_and_fetch_recent_messages_in_chronological_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_message("chan", "alice", "first", "id-1", false, false).await.unwrap();
        store.store_message("chan", "bob", "second", "id-2", false, false).await.unwrap();

        let recent = store.get_recent_messages("chan", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "first");
        assert_eq!(recent[1].content, "second");
    }

    #[tokio::test]
    async fn storing_the_same_message_id_twice_leaves_one_row() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_message("chan", "alice", "hi", "dup-id", false, false).await.unwrap();
        store.store_message("chan", "alice", "hi", "dup-id", false, false).await.unwrap();

        let recent = store.get_recent_messages("chan", 10).await.unwrap();
        assert_eq!(recent.len(), 1);
    }

    #[tokio::test]
    async fn delete_message_removes_by_message_id() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_message("chan", "alice", "hi", "msg-1", false, false).await.unwrap();
        store.store_message("chan", "bob", "hey", "msg-2", false, false).await.unwrap();

        store.delete_message("msg-1").await.unwrap();

        let remaining = store.get_recent_messages("chan", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].message_id, "msg-2");
    }

    #[tokio::test]
    async fn get_config_returns_defaults_when_unset() {
        let store = SqliteStore::open_in_memory().unwrap();
        let config = store.get_config("newchan").await.unwrap();
        assert_eq!(config.message_threshold, 30);
        assert_eq!(config.message_count, 0);
    }

    #[tokio::test]
    async fn update_config_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut config = ChannelConfig::defaults_for("chan");
        config.message_threshold = 50;
        config.model = "mistral".to_string();
        store.update_config(&config).await.unwrap();

        let fetched = store.get_config("chan").await.unwrap();
        assert_eq!(fetched.message_threshold, 50);
        assert_eq!(fetched.model, "mistral");
    }

    #[tokio::test]
    async fn delete_user_messages_only_removes_that_user() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.store_message("chan", "alice", "hi", "id-1", false, false).await.unwrap();
        store.store_message("chan", "bob", "hey", "id-2", false, false).await.unwrap();

        let deleted = store.delete_user_messages("chan", "alice").await.unwrap();
        assert_eq!(deleted, 1);

        let remaining = store.get_recent_messages("chan", 10).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].username, "bob");
    }

    #[tokio::test]
    async fn auth_token_round_trips() {
        let store = SqliteStore::open_in_memory().unwrap();
        let token = AuthToken {
            id: 1,
            access_token_encrypted: vec![1, 2, 3],
            refresh_token_encrypted: vec![4, 5, 6],
            expires_at: Utc::now(),
            bot_username: "clankerbot".to_string(),
            updated_at: Utc::now(),
        };
        store.store_auth_token(&token).await.unwrap();

        let fetched = store.get_auth_token().await.unwrap().unwrap();
        assert_eq!(fetched.bot_username, "clankerbot");

        store.delete_auth_token().await.unwrap();
        assert!(store.get_auth_token().await.unwrap().is_none());
    }
}
