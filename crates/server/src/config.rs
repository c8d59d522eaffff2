//! Server configuration from the environment.

use gateway::QuotaConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_UPSTREAM_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_STORE_CAPACITY: usize = 4096;

// A key left at the setup placeholder counts as unconfigured.
const PLACEHOLDER_KEY: &str = "sk-ant-your-api-key-here";

/// Trial endpoint configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: String,
    /// Server-held upstream credential; `None` makes trial requests 503.
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub quota: QuotaConfig,
    pub store_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            api_key: None,
            upstream_url: DEFAULT_UPSTREAM_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            quota: QuotaConfig::default(),
            store_capacity: DEFAULT_STORE_CAPACITY,
        }
    }
}

impl ServerConfig {
    /// Read configuration from environment variables, falling back to
    /// defaults on anything missing or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.api_key = read_api_key();
        if let Ok(addr) = env::var("SENSEI_ADDR") {
            config.addr = addr;
        }
        if let Ok(model) = env::var("SENSEI_MODEL") {
            config.model = model;
        }
        config.quota.limit = try_load("SENSEI_TRIAL_LIMIT", config.quota.limit);
        let window_hours: u64 = try_load("SENSEI_TRIAL_WINDOW_HOURS", 24);
        config.quota.window = Duration::from_secs(window_hours * 60 * 60);

        config
    }
}

fn read_api_key() -> Option<String> {
    match env::var("ANTHROPIC_API_KEY") {
        Ok(key) if !key.is_empty() && key != PLACEHOLDER_KEY => Some(key),
        _ => {
            tracing::warn!("ANTHROPIC_API_KEY not configured; trial requests will return 503");
            None
        }
    }
}

fn try_load<T: FromStr>(key: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    let Ok(raw) = env::var(key) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("invalid {key} value: {e}");
            default
        }
    }
}
