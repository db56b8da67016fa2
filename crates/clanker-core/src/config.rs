use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (clanker.toml + CLANKER_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClankerConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub token_service: TokenServiceConfig,
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub resource: ResourceConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_kind")]
    pub kind: String,
    #[serde(default = "default_db_path")]
    pub connection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            kind: default_db_kind(),
            connection: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_ollama_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_inference_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            base_url: default_ollama_base_url(),
            default_model: default_model(),
            timeout_ms: default_inference_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TokenServiceConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    #[serde(default = "default_token_encryption_key_env")]
    pub encryption_key_env: String,
}

fn default_token_encryption_key_env() -> String {
    "CLANKER_TOKEN_KEY".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default = "default_blocklist_path")]
    pub blocklist_path: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            blocklist_path: default_blocklist_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    #[serde(default = "default_mem_warning_mb")]
    pub memory_warning_mb: u64,
    #[serde(default = "default_mem_critical_mb")]
    pub memory_critical_mb: u64,
    #[serde(default = "default_disk_warning_pct")]
    pub disk_warning_pct: f32,
    #[serde(default = "default_disk_critical_pct")]
    pub disk_critical_pct: f32,
    #[serde(default = "default_cpu_warning_pct")]
    pub cpu_warning_pct: f32,
    #[serde(default = "default_cpu_critical_pct")]
    pub cpu_critical_pct: f32,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            memory_warning_mb: default_mem_warning_mb(),
            memory_critical_mb: default_mem_critical_mb(),
            disk_warning_pct: default_disk_warning_pct(),
            disk_critical_pct: default_disk_critical_pct(),
            cpu_warning_pct: default_cpu_warning_pct(),
            cpu_critical_pct: default_cpu_critical_pct(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default = "default_message_retention_days")]
    pub message_retention_days: u32,
    #[serde(default = "default_metric_retention_days")]
    pub metric_retention_days: u32,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_retention_days: default_message_retention_days(),
            metric_retention_days: default_metric_retention_days(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

fn bool_true() -> bool {
    true
}
fn default_db_kind() -> String {
    "sqlite".to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.clanker/clanker.db", home)
}
fn default_ollama_base_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3".to_string()
}
fn default_inference_timeout_ms() -> u64 {
    30_000
}
fn default_blocklist_path() -> String {
    "blocked_words.txt".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}
fn default_mem_warning_mb() -> u64 {
    512
}
fn default_mem_critical_mb() -> u64 {
    1024
}
fn default_disk_warning_pct() -> f32 {
    80.0
}
fn default_disk_critical_pct() -> f32 {
    95.0
}
fn default_cpu_warning_pct() -> f32 {
    80.0
}
fn default_cpu_critical_pct() -> f32 {
    95.0
}
fn default_message_retention_days() -> u32 {
    30
}
fn default_metric_retention_days() -> u32 {
    7
}
fn default_cleanup_interval_minutes() -> u32 {
    60
}

impl ClankerConfig {
    /// Load config from a TOML file with CLANKER_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.clanker/clanker.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: ClankerConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CLANKER_").split("_"))
            .extract()
            .map_err(|e| crate::error::ClankerError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.clanker/clanker.toml", home)
}
