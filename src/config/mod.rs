//! Configuration loading (spec §6 environment variable table).
//!
//! Environment variables are the primary, load-bearing source — every name in
//! spec.md §6 is recognized here. An optional YAML override file is supported
//! for local development convenience, mirroring `litellm-rs`'s
//! `config/gateway.yaml` without making it part of the documented contract.

use crate::core::types::RoutingStrategy;
use crate::utils::error::{GatewayError, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

fn default_port() -> u16 {
    4000
}

fn default_log_level() -> String {
    "info".into()
}

fn default_cache_ttl_seconds() -> u64 {
    3600
}

fn default_cache_similarity_threshold() -> f32 {
    0.95
}

fn default_cache_max_entries() -> usize {
    10_000
}

fn default_routing_strategy() -> RoutingStrategy {
    RoutingStrategy::Balanced
}

fn default_log_batch_size() -> usize {
    50
}

fn default_log_flush_interval_ms() -> u64 {
    5_000
}

fn default_health_check_interval_secs() -> u64 {
    30
}

/// Process-level configuration. Constructed once at startup via
/// [`GatewayConfig::from_env`] (optionally layered with a YAML file via
/// [`GatewayConfig::from_file`]) and handed by reference to every component
/// wired together in `main.rs`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub node_env: Option<String>,

    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub redis_url: Option<String>,

    #[serde(default)]
    pub openai_api_key: Option<String>,
    #[serde(default)]
    pub anthropic_api_key: Option<String>,
    #[serde(default)]
    pub groq_api_key: Option<String>,
    #[serde(default)]
    pub together_api_key: Option<String>,
    #[serde(default)]
    pub ollama_url: Option<String>,

    #[serde(default)]
    pub admin_api_key: Option<String>,

    #[serde(default)]
    pub enable_metrics: bool,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub redact_prompts: bool,

    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,
    #[serde(default = "default_cache_similarity_threshold")]
    pub cache_similarity_threshold: f32,
    #[serde(default = "default_cache_max_entries")]
    pub cache_max_entries: usize,

    #[serde(default)]
    pub global_monthly_usd_budget: Option<f64>,
    #[serde(default)]
    pub global_monthly_token_budget: Option<u64>,

    #[serde(default = "default_routing_strategy_string")]
    pub default_routing_strategy: String,

    #[serde(default = "default_log_batch_size")]
    pub log_batch_size: usize,
    #[serde(default = "default_log_flush_interval_ms")]
    pub log_flush_interval_ms: u64,
    #[serde(default = "default_health_check_interval_secs")]
    pub health_check_interval_secs: u64,
}

fn default_routing_strategy_string() -> String {
    "balanced".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            node_env: None,
            database_url: None,
            redis_url: None,
            openai_api_key: None,
            anthropic_api_key: None,
            groq_api_key: None,
            together_api_key: None,
            ollama_url: None,
            admin_api_key: None,
            enable_metrics: false,
            log_level: default_log_level(),
            redact_prompts: false,
            cache_ttl_seconds: default_cache_ttl_seconds(),
            cache_similarity_threshold: default_cache_similarity_threshold(),
            cache_max_entries: default_cache_max_entries(),
            global_monthly_usd_budget: None,
            global_monthly_token_budget: None,
            default_routing_strategy: default_routing_strategy_string(),
            log_batch_size: default_log_batch_size(),
            log_flush_interval_ms: default_log_flush_interval_ms(),
            health_check_interval_secs: default_health_check_interval_secs(),
        }
    }
}

impl GatewayConfig {
    /// Load from environment variables, matching spec.md §6's table exactly.
    pub fn from_env() -> Result<Self> {
        debug!("loading configuration from environment variables");
        let mut config = Self::default();

        if let Ok(v) = env::var("PORT") {
            config.port = v
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid PORT: {e}")))?;
        }
        config.node_env = env::var("NODE_ENV").ok();
        config.database_url = env::var("DATABASE_URL").ok();
        config.redis_url = env::var("REDIS_URL").ok();
        config.openai_api_key = env::var("OPENAI_API_KEY").ok();
        config.anthropic_api_key = env::var("ANTHROPIC_API_KEY").ok();
        config.groq_api_key = env::var("GROQ_API_KEY").ok();
        config.together_api_key = env::var("TOGETHER_API_KEY").ok();
        config.ollama_url = env::var("OLLAMA_URL").ok();
        config.admin_api_key = env::var("ADMIN_API_KEY").ok();

        if let Ok(v) = env::var("ENABLE_METRICS") {
            config.enable_metrics = parse_bool(&v)
                .map_err(|e| GatewayError::Config(format!("invalid ENABLE_METRICS: {e}")))?;
        }
        if let Ok(v) = env::var("LOG_LEVEL") {
            if !matches!(v.as_str(), "debug" | "info" | "warn" | "error") {
                return Err(GatewayError::Config(format!("invalid LOG_LEVEL: {v}")));
            }
            config.log_level = v;
        }
        if let Ok(v) = env::var("REDACT_PROMPTS") {
            config.redact_prompts = parse_bool(&v)
                .map_err(|e| GatewayError::Config(format!("invalid REDACT_PROMPTS: {e}")))?;
        }
        if let Ok(v) = env::var("CACHE_TTL_SECONDS") {
            config.cache_ttl_seconds = v
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid CACHE_TTL_SECONDS: {e}")))?;
        }
        if let Ok(v) = env::var("CACHE_SIMILARITY_THRESHOLD") {
            config.cache_similarity_threshold = v.parse().map_err(|e| {
                GatewayError::Config(format!("invalid CACHE_SIMILARITY_THRESHOLD: {e}"))
            })?;
        }
        if let Ok(v) = env::var("CACHE_MAX_ENTRIES") {
            config.cache_max_entries = v
                .parse()
                .map_err(|e| GatewayError::Config(format!("invalid CACHE_MAX_ENTRIES: {e}")))?;
        }
        if let Ok(v) = env::var("GLOBAL_MONTHLY_USD_BUDGET") {
            config.global_monthly_usd_budget = Some(v.parse().map_err(|e| {
                GatewayError::Config(format!("invalid GLOBAL_MONTHLY_USD_BUDGET: {e}"))
            })?);
        }
        if let Ok(v) = env::var("GLOBAL_MONTHLY_TOKEN_BUDGET") {
            config.global_monthly_token_budget = Some(v.parse().map_err(|e| {
                GatewayError::Config(format!("invalid GLOBAL_MONTHLY_TOKEN_BUDGET: {e}"))
            })?);
        }
        if let Ok(v) = env::var("DEFAULT_ROUTING_STRATEGY") {
            RoutingStrategy::from_str(&v).map_err(GatewayError::Config)?;
            config.default_routing_strategy = v;
        }

        debug!("configuration loaded from environment");
        Ok(config)
    }

    /// Optional local-development YAML config, used in place of
    /// `from_env` rather than layered on top of it. Not part of the
    /// documented env-var contract; fields the file omits fall back to the
    /// same defaults `from_env` uses.
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration overlay");
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::Config(format!("failed to read config file: {e}")))?;
        let overlay: GatewayConfig = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("failed to parse config file: {e}")))?;
        Ok(overlay)
    }

    pub fn routing_strategy(&self) -> RoutingStrategy {
        RoutingStrategy::from_str(&self.default_routing_strategy).unwrap_or(RoutingStrategy::Balanced)
    }

    pub fn is_production(&self) -> bool {
        self.node_env.as_deref() == Some("production")
    }
}

fn parse_bool(v: &str) -> std::result::Result<bool, String> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("not a boolean: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, 4000);
        assert_eq!(config.cache_ttl_seconds, 3600);
        assert_eq!(config.cache_similarity_threshold, 0.95);
        assert_eq!(config.cache_max_entries, 10_000);
        assert_eq!(config.default_routing_strategy, "balanced");
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert_eq!(parse_bool("true"), Ok(true));
        assert_eq!(parse_bool("0"), Ok(false));
        assert!(parse_bool("maybe").is_err());
    }
}
