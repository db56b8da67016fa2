use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{InferenceError, Result};
use crate::health::HealthTracker;
use crate::model_cache::ModelCache;
use crate::sanitize::sanitize_response;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Thin HTTP client over the Ollama API (`/api/tags`, `/api/generate`),
/// wrapped with a health state machine and a model-existence cache.
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    health: HealthTracker,
    model_cache: ModelCache,
}

impl OllamaClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builds");
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            health: HealthTracker::new(),
            model_cache: ModelCache::new(),
        }
    }

    pub fn health(&self) -> &HealthTracker {
        &self.health
    }

    /// Validate a model exists on the backend, using the 5-minute cache.
    /// Called on startup in strict mode (propagates errors) and opportunistically
    /// before generation in silent-failure mode (see [`Self::generate_with_fallback`]).
    pub async fn validate_model(&self, model: &str) -> Result<bool> {
        if let Some(cached) = self.model_cache.get(model) {
            return Ok(cached);
        }

        let url = format!("{}/api/tags", self.base_url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(InferenceError::Api(format!(
                "tags endpoint returned {}",
                resp.status()
            )));
        }
        let tags: TagsResponse = resp.json().await?;
        let available = tags.models.iter().any(|t| t.name == model || t.name.starts_with(&format!("{model}:")));
        self.model_cache.set(model, available);
        Ok(available)
    }

    /// Strict generation: propagates every failure. Used by startup validation.
    pub async fn generate(&self, model: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest { model, prompt, stream: false };

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InferenceError::Timeout
                } else if e.is_connect() {
                    InferenceError::Unavailable
                } else {
                    InferenceError::Http(e)
                }
            })?;

        if !resp.status().is_success() {
            return Err(InferenceError::Api(format!(
                "generate endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: GenerateResponse = resp.json().await?;
        if !parsed.done {
            warn!(model, "generate response marked not done");
        }
        Ok(sanitize_response(&parsed.response))
    }

    /// Silent-failure wrapper: any forbidding health state, a timeout, or a
    /// connection/API error resolves to the literal string `"no message"`
    /// rather than propagating — this is the entry point normal generation
    /// flows through (spontaneous contributions, mention responses).
    pub async fn generate_with_fallback(&self, model: &str, prompt: &str) -> String {
        if !self.health.should_attempt() {
            return "no message".to_string();
        }

        match self.validate_model(model).await {
            Ok(true) => {}
            Ok(false) => {
                warn!(model, "model not available on inference backend");
                return "no message".to_string();
            }
            Err(e) => {
                warn!(error = %e, "model validation failed");
                self.health.record_failure();
                return "no message".to_string();
            }
        }

        match self.generate(model, prompt).await {
            Ok(text) => {
                self.health.record_success();
                text
            }
            Err(e) => {
                warn!(error = %e, "generation failed, falling back to silence");
                self.health.record_failure();
                "no message".to_string()
            }
        }
    }

    /// Startup validation: confirms the configured model exists, propagating
    /// failure so the process can refuse to start misconfigured.
    pub async fn validate_startup(&self, model: &str) -> Result<()> {
        if !self.validate_model(model).await? {
            return Err(InferenceError::ModelUnavailable(model.to_string()));
        }
        info!(model, "inference backend validated at startup");
        Ok(())
    }
}
