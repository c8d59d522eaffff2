//! Provider selection and dispatch.

use crate::provider::{
    AnthropicAdapter, ChatBackend, ChatMessage, QuotaStatus, TrialAdapter, WorkerAdapter,
};
use crate::{Error, Result};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// The active provider identity and its credentials.
///
/// Exactly one variant is active at a time; [`ProviderRouter::configure`]
/// replaces the whole configuration, so nothing leaks between providers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderConfig {
    /// Direct Anthropic access with a caller-supplied secret.
    DirectKey { secret_key: String },
    /// Server-credentialed free tier.
    Trial,
    /// Third-party relay; `None` endpoint selects the shared worker.
    ProxiedWorker {
        endpoint_url: Option<String>,
        worker_api_key: Option<String>,
    },
}

/// Deployment knobs shared by every adapter the router builds.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Trial backend endpoint; `None` selects the local default.
    pub trial_endpoint: Option<String>,
    /// Overall deadline for one upstream call.
    pub timeout: Duration,
}

impl Default for RouterOptions {
    fn default() -> Self {
        Self {
            trial_endpoint: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

enum Active {
    Direct(AnthropicAdapter),
    Trial(TrialAdapter),
    Worker(WorkerAdapter),
}

/// Single entry point in front of the adapters.
pub struct ProviderRouter {
    options: RouterOptions,
    active: Option<Active>,
}

impl ProviderRouter {
    pub fn new() -> Self {
        Self::with_options(RouterOptions::default())
    }

    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            active: None,
        }
    }

    /// Swap in the matching adapter for `config`.
    ///
    /// The previous adapter is dropped before this returns; a later `chat`
    /// can only reach the new one.
    pub fn configure(&mut self, config: ProviderConfig) {
        let adapter = match config {
            ProviderConfig::DirectKey { secret_key } => Active::Direct(
                AnthropicAdapter::builder(secret_key)
                    .timeout(self.options.timeout)
                    .build(),
            ),
            ProviderConfig::Trial => Active::Trial(TrialAdapter::new(
                self.options.trial_endpoint.clone(),
                self.options.timeout,
            )),
            ProviderConfig::ProxiedWorker {
                endpoint_url,
                worker_api_key,
            } => Active::Worker(WorkerAdapter::new(
                endpoint_url,
                worker_api_key,
                self.options.timeout,
            )),
        };
        self.active = Some(adapter);
    }

    /// Whether the active adapter can take a call.
    pub fn is_ready(&self) -> bool {
        match &self.active {
            Some(Active::Direct(adapter)) => adapter.is_ready(),
            Some(Active::Trial(adapter)) => adapter.is_ready(),
            Some(Active::Worker(adapter)) => adapter.is_ready(),
            None => false,
        }
    }

    /// Forward the conversation to the active adapter.
    ///
    /// Adapter errors propagate unchanged; only the missing-provider case is
    /// produced here.
    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        if !self.is_ready() {
            return Err(Error::NotConfigured);
        }
        match self.active.as_ref() {
            Some(Active::Direct(adapter)) => adapter.chat(messages).await,
            Some(Active::Trial(adapter)) => adapter.chat(messages).await,
            Some(Active::Worker(adapter)) => adapter.chat(messages).await,
            None => Err(Error::NotConfigured),
        }
    }

    /// Free-tier allowance estimate; `None` unless the trial is active.
    pub fn quota_status(&self) -> Option<QuotaStatus> {
        match &self.active {
            Some(Active::Trial(adapter)) => Some(adapter.quota_status()),
            _ => None,
        }
    }
}

impl Default for ProviderRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::testutil::spawn_app;
    use crate::quota::DEFAULT_LIMIT;
    use axum::{Json, Router, routing::post};
    use serde_json::json;

    #[tokio::test]
    async fn unconfigured_router_rejects_chat() {
        let router = ProviderRouter::new();
        assert!(!router.is_ready());

        let err = router.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured));
    }

    #[tokio::test]
    async fn empty_key_leaves_router_not_ready() {
        let mut router = ProviderRouter::new();
        router.configure(ProviderConfig::DirectKey {
            secret_key: String::new(),
        });

        assert!(!router.is_ready());
        let err = router.chat(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, Error::NotConfigured));
    }

    #[test]
    fn switching_providers_replaces_readiness() {
        let mut router = ProviderRouter::new();

        router.configure(ProviderConfig::DirectKey {
            secret_key: String::new(),
        });
        assert!(!router.is_ready());

        // Readiness now reflects the trial, not the stale direct-key state.
        router.configure(ProviderConfig::Trial);
        assert!(router.is_ready());

        router.configure(ProviderConfig::DirectKey {
            secret_key: "sk-ant-test".to_string(),
        });
        assert!(router.is_ready());
    }

    #[test]
    fn quota_status_only_for_the_trial() {
        let mut router = ProviderRouter::new();
        assert_eq!(router.quota_status(), None);

        router.configure(ProviderConfig::Trial);
        let status = router.quota_status().unwrap();
        assert_eq!(status.remaining, DEFAULT_LIMIT);

        router.configure(ProviderConfig::ProxiedWorker {
            endpoint_url: None,
            worker_api_key: None,
        });
        assert_eq!(router.quota_status(), None);
    }

    #[tokio::test]
    async fn dispatches_to_the_configured_worker() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                Json(json!({"choices": [{"message": {"role": "assistant", "content": "via relay"}}]}))
            }),
        );
        let addr = spawn_app(app).await;

        let mut router = ProviderRouter::new();
        router.configure(ProviderConfig::ProxiedWorker {
            endpoint_url: Some(format!("http://{addr}")),
            worker_api_key: None,
        });

        let reply = router.chat(&[ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(reply, "via relay");
    }
}
