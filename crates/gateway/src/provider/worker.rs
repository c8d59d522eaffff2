//! Relay adapter for a third-party worker endpoint.
//!
//! Speaks the OpenAI chat-completions shape the relay expects and translates
//! back to plain text. The bearer credential is optional; the shared public
//! worker takes unauthenticated requests.

use super::{ChatBackend, ChatMessage, Role};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shared relay, free for all users.
pub const DEFAULT_WORKER_URL: &str = "https://python-tutor-ai.pythontutor.workers.dev";

const DEFAULT_MODEL: &str = "claude-3-haiku";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct RelayRequest {
    model: String,
    messages: Vec<RelayMessage>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RelayMessage {
    role: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    choices: Vec<RelayChoice>,
}

#[derive(Debug, Deserialize)]
struct RelayChoice {
    #[serde(default)]
    message: Option<RelayMessage>,
}

/// Adapter for a caller-configured relay endpoint.
pub struct WorkerAdapter {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
}

impl WorkerAdapter {
    pub fn new(endpoint: Option<String>, api_key: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_WORKER_URL.to_string()),
            api_key,
            model: DEFAULT_MODEL.to_string(),
            timeout,
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn role_to_relay(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Default for WorkerAdapter {
    fn default() -> Self {
        Self::new(None, None, DEFAULT_TIMEOUT)
    }
}

impl ChatBackend for WorkerAdapter {
    fn is_ready(&self) -> bool {
        !self.endpoint.is_empty()
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let request = RelayRequest {
            model: self.model.clone(),
            messages: messages
                .iter()
                .map(|m| RelayMessage {
                    role: Self::role_to_relay(m.role).to_string(),
                    content: m.content.clone(),
                })
                .collect(),
        };

        let mut req = self
            .client
            .post(format!("{}/v1/chat/completions", self.endpoint))
            .timeout(self.timeout)
            .header("content-type", "application/json");

        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, body });
        }

        let relay_response: RelayResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(relay_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message)
            .map(|m| m.content)
            .unwrap_or_default())
    }
}
