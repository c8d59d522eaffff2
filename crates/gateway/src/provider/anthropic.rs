//! Direct-key adapter for the Anthropic Messages API.

use super::{ChatBackend, ChatMessage, Role, split_system};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-5-haiku-20241022";
const DEFAULT_MAX_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Serialize)]
struct ApiRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    // Defaulted so a response missing the text content degrades to an empty
    // string instead of a hard failure.
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

/// Builder for the direct-key adapter.
#[derive(Debug, Clone)]
pub struct AnthropicAdapterBuilder {
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    api_url: String,
}

impl AnthropicAdapterBuilder {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            api_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Overall deadline for one upstream call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Override the API endpoint (self-hosted gateways, tests).
    pub fn api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn build(self) -> AnthropicAdapter {
        AnthropicAdapter {
            client: reqwest::Client::new(),
            api_key: self.api_key,
            model: self.model,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
            api_url: self.api_url,
        }
    }
}

/// Adapter holding a caller-supplied secret key.
pub struct AnthropicAdapter {
    client: reqwest::Client,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout: Duration,
    api_url: String,
}

impl AnthropicAdapter {
    pub fn builder(api_key: impl Into<String>) -> AnthropicAdapterBuilder {
        AnthropicAdapterBuilder::new(api_key)
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User | Role::System => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl ChatBackend for AnthropicAdapter {
    fn is_ready(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let (system, turns) = split_system(messages);

        let api_messages: Vec<ApiMessage> = turns
            .iter()
            .map(|m| ApiMessage {
                role: Self::role_to_api(m.role),
                content: m.content.clone(),
            })
            .collect();

        let request = ApiRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            messages: api_messages,
            system: system.map(str::to_string),
        };

        let response = self
            .client
            .post(&self.api_url)
            .timeout(self.timeout)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream { status, body });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        Ok(api_response
            .content
            .into_iter()
            .map(|b| b.text)
            .collect::<Vec<_>>()
            .join(""))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testutil::spawn_app;
    use super::*;
    use axum::{Json, Router, http::HeaderMap, routing::post};
    use serde_json::{Value, json};

    fn adapter_for(addr: std::net::SocketAddr) -> AnthropicAdapter {
        AnthropicAdapter::builder("sk-ant-test")
            .api_url(format!("http://{addr}/v1/messages"))
            .build()
    }

    #[test]
    fn readiness_requires_a_key() {
        assert!(AnthropicAdapter::builder("sk-ant-test").build().is_ready());
        assert!(!AnthropicAdapter::builder("").build().is_ready());
    }

    #[tokio::test]
    async fn sends_system_out_of_band_and_returns_text() {
        let app = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                assert_eq!(headers.get("x-api-key").unwrap(), "sk-ant-test");
                assert_eq!(body["system"], "be brief");
                let messages = body["messages"].as_array().unwrap();
                assert_eq!(messages.len(), 1);
                assert_eq!(messages[0]["role"], "user");
                Json(json!({
                    "content": [{"type": "text", "text": "short answer"}],
                    "usage": {"input_tokens": 3, "output_tokens": 2}
                }))
            }),
        );
        let addr = spawn_app(app).await;

        let reply = adapter_for(addr)
            .chat(&[ChatMessage::system("be brief"), ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "short answer");
    }

    #[tokio::test]
    async fn missing_text_degrades_to_empty_string() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async { Json(json!({"id": "msg_0"})) }),
        );
        let addr = spawn_app(app).await;

        let reply = adapter_for(addr)
            .chat(&[ChatMessage::user("hi")])
            .await
            .unwrap();
        assert_eq!(reply, "");
    }

    #[tokio::test]
    async fn non_success_surfaces_status_and_body() {
        let app = Router::new().route(
            "/v1/messages",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "bad key") }),
        );
        let addr = spawn_app(app).await;

        let err = adapter_for(addr)
            .chat(&[ChatMessage::user("hi")])
            .await
            .unwrap_err();
        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "bad key");
            }
            other => panic!("expected Upstream, got {other:?}"),
        }
    }
}
