//! Configuration loading from sensei.toml.

use gateway::{ProviderConfig, RouterOptions};
use serde::Deserialize;
use server::ServerConfig;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Active provider.
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default)]
    pub anthropic: AnthropicSection,

    #[serde(default)]
    pub trial: TrialSection,

    #[serde(default)]
    pub worker: WorkerSection,

    #[serde(default)]
    pub server: ServerSection,
}

/// Provider selector; `trial` needs no credentials and is the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Anthropic,
    #[default]
    Trial,
    Worker,
}

#[derive(Debug, Deserialize, Default)]
pub struct AnthropicSection {
    /// Anthropic API key (sk-ant-api01-...).
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct TrialSection {
    /// Trial backend endpoint; defaults to the local server.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct WorkerSection {
    /// Relay endpoint; defaults to the shared worker.
    pub endpoint: Option<String>,
    /// Bearer credential for custom workers.
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    pub addr: Option<String>,
    pub limit: Option<u32>,
    pub window_hours: Option<u64>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the provider configuration for the router.
    pub fn provider_config(&self) -> Result<ProviderConfig, ConfigError> {
        match self.provider {
            ProviderKind::Anthropic => {
                let secret_key = self
                    .anthropic
                    .api_key
                    .clone()
                    .ok_or(ConfigError::MissingApiKey)?;
                Ok(ProviderConfig::DirectKey { secret_key })
            }
            ProviderKind::Trial => Ok(ProviderConfig::Trial),
            ProviderKind::Worker => Ok(ProviderConfig::ProxiedWorker {
                endpoint_url: self.worker.endpoint.clone(),
                worker_api_key: self.worker.api_key.clone(),
            }),
        }
    }

    pub fn router_options(&self) -> RouterOptions {
        RouterOptions {
            trial_endpoint: self.trial.endpoint.clone(),
            ..RouterOptions::default()
        }
    }

    /// Server configuration: environment first, file overrides on top.
    pub fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::from_env();
        if let Some(addr) = &self.server.addr {
            config.addr = addr.clone();
        }
        if let Some(limit) = self.server.limit {
            config.quota.limit = limit;
        }
        if let Some(hours) = self.server.window_hours {
            config.quota.window = Duration::from_secs(hours * 60 * 60);
        }
        config
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("provider \"anthropic\" requires anthropic.api_key")]
    MissingApiKey,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_the_trial_provider() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.provider, ProviderKind::Trial);
        assert!(matches!(
            config.provider_config().unwrap(),
            ProviderConfig::Trial
        ));
    }

    #[test]
    fn anthropic_provider_requires_a_key() {
        let config = Config::parse("provider = \"anthropic\"").unwrap();
        assert!(matches!(
            config.provider_config(),
            Err(ConfigError::MissingApiKey)
        ));

        let config = Config::parse(
            "provider = \"anthropic\"\n\n[anthropic]\napi_key = \"sk-ant-test\"\n",
        )
        .unwrap();
        match config.provider_config().unwrap() {
            ProviderConfig::DirectKey { secret_key } => assert_eq!(secret_key, "sk-ant-test"),
            other => panic!("expected DirectKey, got {other:?}"),
        }
    }

    #[test]
    fn worker_provider_carries_optional_credentials() {
        let config = Config::parse(
            "provider = \"worker\"\n\n[worker]\nendpoint = \"https://relay.example\"\n",
        )
        .unwrap();
        match config.provider_config().unwrap() {
            ProviderConfig::ProxiedWorker {
                endpoint_url,
                worker_api_key,
            } => {
                assert_eq!(endpoint_url.as_deref(), Some("https://relay.example"));
                assert_eq!(worker_api_key, None);
            }
            other => panic!("expected ProxiedWorker, got {other:?}"),
        }
    }

    #[test]
    fn unknown_provider_is_rejected() {
        assert!(Config::parse("provider = \"duckduckgo\"").is_err());
    }

    #[test]
    fn server_section_overrides_quota() {
        let config =
            Config::parse("[server]\nlimit = 10\nwindow_hours = 1\n").unwrap();
        let server_config = config.server_config();
        assert_eq!(server_config.quota.limit, 10);
        assert_eq!(server_config.quota.window, Duration::from_secs(3600));
    }
}
