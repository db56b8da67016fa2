use rusqlite::{Connection, Result};

/// Initialise the persisted schema. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_messages_table(conn)?;
    create_channel_configs_table(conn)?;
    create_user_response_cooldowns_table(conn)?;
    create_auth_tokens_table(conn)?;
    create_bot_metrics_table(conn)?;
    Ok(())
}

fn create_messages_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS messages (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            message_id      TEXT NOT NULL UNIQUE,
            channel         TEXT NOT NULL,
            username        TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL,
            is_bot_message  INTEGER NOT NULL DEFAULT 0,
            is_mention      INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_messages_channel_ts
            ON messages(channel, timestamp DESC);
        CREATE INDEX IF NOT EXISTS idx_messages_username
            ON messages(channel, username);",
    )
}

fn create_channel_configs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS channel_configs (
            channel                     TEXT PRIMARY KEY,
            message_threshold           INTEGER NOT NULL DEFAULT 30,
            spontaneous_cooldown_secs   INTEGER NOT NULL DEFAULT 300,
            response_cooldown_secs      INTEGER NOT NULL DEFAULT 60,
            context_limit               INTEGER NOT NULL DEFAULT 200,
            model                       TEXT NOT NULL DEFAULT '',
            message_count               INTEGER NOT NULL DEFAULT 0,
            last_spontaneous_at         TEXT
        );",
    )
}

fn create_user_response_cooldowns_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS user_response_cooldowns (
            channel          TEXT NOT NULL,
            username         TEXT NOT NULL,
            last_response_at TEXT NOT NULL,
            PRIMARY KEY (channel, username)
        );",
    )
}

fn create_auth_tokens_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS auth_tokens (
            id                        INTEGER PRIMARY KEY CHECK (id = 1),
            access_token_encrypted    BLOB NOT NULL,
            refresh_token_encrypted   BLOB NOT NULL,
            expires_at                TEXT NOT NULL,
            bot_username              TEXT NOT NULL,
            updated_at                TEXT NOT NULL
        );",
    )
}

fn create_bot_metrics_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS bot_metrics (
            id           INTEGER PRIMARY KEY AUTOINCREMENT,
            channel      TEXT NOT NULL,
            metric_type  TEXT NOT NULL,
            value        REAL NOT NULL,
            recorded_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_metrics_channel_type_ts
            ON bot_metrics(channel, metric_type, recorded_at DESC);",
    )
}
