use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use clanker_core::types::AuthToken;
use clanker_memory::store::Store;

use crate::crypto::{decrypt, encrypt};
use crate::error::{AuthError, Result};

const REFRESH_ATTEMPTS: u32 = 3;
const REFRESH_BACKOFFS_SECS: [u64; 3] = [1, 2, 4];
/// Refresh this far before actual expiry so a borrowed token is never handed
/// out within sight of going stale.
const EXPIRY_SAFETY_MARGIN: ChronoDuration = ChronoDuration::seconds(60);

/// Surface the rest of the system depends on for Twitch credentials. Kept
/// narrow and object-safe so `clanker-irc`'s transport only needs a trait
/// object, never this crate's internals.
#[async_trait]
pub trait TokenService: Send + Sync {
    async fn ensure_valid_token(&self) -> Result<String>;
    async fn get_bot_username(&self) -> Result<String>;
    async fn revoke_tokens(&self) -> Result<()>;
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
    bot_username: String,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    expires_in: i64,
}

/// `TokenService` backed by the Twitch OAuth `refresh_token` grant, with
/// tokens encrypted at rest in `clanker-memory`'s `auth_tokens` table.
pub struct TwitchTokenService<S: Store> {
    http: reqwest::Client,
    store: Arc<S>,
    client_id: String,
    client_secret: String,
    encryption_key: [u8; 32],
    cache: RwLock<Option<CachedToken>>,
}

impl<S: Store> TwitchTokenService<S> {
    pub fn new(store: Arc<S>, client_id: String, client_secret: String, encryption_key: [u8; 32]) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
            store,
            client_id,
            client_secret,
            encryption_key,
            cache: RwLock::new(None),
        }
    }

    async fn load_from_store(&self) -> Result<Option<CachedToken>> {
        let Some(row) = self.store.get_auth_token().await.map_err(|e| AuthError::Store(e.to_string()))? else {
            return Ok(None);
        };
        let access = decrypt(&self.encryption_key, &row.access_token_encrypted)?;
        let refresh = decrypt(&self.encryption_key, &row.refresh_token_encrypted)?;
        Ok(Some(CachedToken {
            access_token: String::from_utf8_lossy(&access).to_string(),
            refresh_token: String::from_utf8_lossy(&refresh).to_string(),
            expires_at: row.expires_at,
            bot_username: row.bot_username,
        }))
    }

    async fn persist(&self, token: &CachedToken) -> Result<()> {
        let row = AuthToken {
            id: 1,
            access_token_encrypted: encrypt(&self.encryption_key, token.access_token.as_bytes())?,
            refresh_token_encrypted: encrypt(&self.encryption_key, token.refresh_token.as_bytes())?,
            expires_at: token.expires_at,
            bot_username: token.bot_username.clone(),
            updated_at: Utc::now(),
        };
        self.store.store_auth_token(&row).await.map_err(|e| AuthError::Store(e.to_string()))
    }

    fn still_valid(token: &CachedToken) -> bool {
        Utc::now() + EXPIRY_SAFETY_MARGIN < token.expires_at
    }

    /// Refresh-token grant with 3 attempts and 1s/2s/4s backoff.
    async fn refresh(&self, refresh_token: &str, bot_username: &str) -> Result<CachedToken> {
        let mut last_err = None;
        for (attempt, delay_secs) in REFRESH_BACKOFFS_SECS.iter().enumerate().take(REFRESH_ATTEMPTS as usize) {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(*delay_secs)).await;
            }
            let result = self
                .http
                .post("https://id.twitch.tv/oauth2/token")
                .form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                ])
                .send()
                .await;

            match result {
                Ok(resp) if resp.status().is_success() => {
                    let body: RefreshResponse = resp.json().await.map_err(AuthError::Http)?;
                    return Ok(CachedToken {
                        access_token: body.access_token,
                        refresh_token: body.refresh_token,
                        expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in),
                        bot_username: bot_username.to_string(),
                    });
                }
                Ok(resp) => {
                    last_err = Some(AuthError::Api(format!("token refresh returned {}", resp.status())));
                }
                Err(e) => {
                    last_err = Some(AuthError::Http(e));
                }
            }
            warn!(attempt = attempt + 1, "token refresh attempt failed");
        }
        Err(AuthError::RefreshFailed(
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string()),
        ))
    }
}

#[async_trait]
impl<S: Store + Send + Sync> TokenService for TwitchTokenService<S> {
    async fn ensure_valid_token(&self) -> Result<String> {
        {
            let guard = self.cache.read().await;
            if let Some(token) = guard.as_ref() {
                if Self::still_valid(token) {
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.cache.write().await;
        if let Some(token) = guard.as_ref() {
            if Self::still_valid(token) {
                return Ok(token.access_token.clone());
            }
        }

        let current = match guard.clone() {
            Some(t) => t,
            None => self.load_from_store().await?.ok_or(AuthError::NotConfigured)?,
        };

        if Self::still_valid(&current) {
            *guard = Some(current.clone());
            return Ok(current.access_token);
        }

        let refreshed = self.refresh(&current.refresh_token, &current.bot_username).await?;
        self.persist(&refreshed).await?;
        let access_token = refreshed.access_token.clone();
        *guard = Some(refreshed);
        info!("refreshed twitch access token");
        Ok(access_token)
    }

    async fn get_bot_username(&self) -> Result<String> {
        {
            let guard = self.cache.read().await;
            if let Some(token) = guard.as_ref() {
                return Ok(token.bot_username.clone());
            }
        }
        let loaded = self.load_from_store().await?.ok_or(AuthError::NotConfigured)?;
        Ok(loaded.bot_username)
    }

    async fn revoke_tokens(&self) -> Result<()> {
        let token = {
            let guard = self.cache.read().await;
            guard.clone()
        };
        if let Some(token) = token {
            let _ = self
                .http
                .post("https://id.twitch.tv/oauth2/revoke")
                .form(&[("client_id", self.client_id.as_str()), ("token", token.access_token.as_str())])
                .send()
                .await;
        }
        *self.cache.write().await = None;
        self.store.delete_auth_token().await.map_err(|e| AuthError::Store(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clanker_memory::store::SqliteStore;

    fn key() -> [u8; 32] {
        crate::crypto::key_from_str("test-key-test-key-test-key-12345")
    }

    #[tokio::test]
    async fn ensure_valid_token_errors_when_not_configured() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TwitchTokenService::new(store, "id".to_string(), "secret".to_string(), key());
        let result = service.ensure_valid_token().await;
        assert!(matches!(result, Err(AuthError::NotConfigured)));
    }

    #[tokio::test]
    async fn ensure_valid_token_returns_cached_unexpired_token() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TwitchTokenService::new(store, "id".to_string(), "secret".to_string(), key());
        let token = CachedToken {
            access_token: "abc123".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            bot_username: "clankerbot".to_string(),
        };
        service.persist(&token).await.unwrap();
        *service.cache.write().await = Some(token);

        let access_token = service.ensure_valid_token().await.unwrap();
        assert_eq!(access_token, "abc123");
    }

    #[tokio::test]
    async fn get_bot_username_reads_through_store_when_uncached() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let service = TwitchTokenService::new(store, "id".to_string(), "secret".to_string(), key());
        let token = CachedToken {
            access_token: "abc".to_string(),
            refresh_token: "refresh".to_string(),
            expires_at: Utc::now() + ChronoDuration::hours(1),
            bot_username: "clankerbot".to_string(),
        };
        service.persist(&token).await.unwrap();

        let username = service.get_bot_username().await.unwrap();
        assert_eq!(username, "clankerbot");
    }
}
