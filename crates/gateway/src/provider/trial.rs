//! Free-trial adapter.
//!
//! Holds no secret: chats go to a backend endpoint that owns the real
//! credential and runs the admission gate before forwarding upstream. The
//! quota metadata it returns is cached here purely for display; the server's
//! decision is the only authoritative one.

use super::{ChatBackend, ChatMessage};
use crate::quota::DEFAULT_LIMIT;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:8787/api/ai";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Display estimate of the free-tier allowance, from the last response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub remaining: u32,
    /// Epoch milliseconds; zero until the first response arrives.
    pub reset_at: u64,
}

#[derive(Debug, Serialize)]
struct TrialRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct TrialResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    remaining: Option<u32>,
    #[serde(default, rename = "resetTime")]
    reset_time: Option<u64>,
}

/// Adapter for the server-credentialed free tier.
pub struct TrialAdapter {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    status: Mutex<QuotaStatus>,
}

impl TrialAdapter {
    pub fn new(endpoint: Option<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            timeout,
            status: Mutex::new(QuotaStatus {
                remaining: DEFAULT_LIMIT,
                reset_at: 0,
            }),
        }
    }

    /// Last-seen allowance. Advisory only; stale between requests.
    pub fn quota_status(&self) -> QuotaStatus {
        *self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn update_status(&self, remaining: Option<u32>, reset_at: Option<u64>) {
        let mut status = self
            .status
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(remaining) = remaining {
            status.remaining = remaining;
        }
        if let Some(reset_at) = reset_at {
            status.reset_at = reset_at;
        }
    }

    fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
        headers.get(name)?.to_str().ok()?.parse().ok()
    }
}

impl Default for TrialAdapter {
    fn default() -> Self {
        Self::new(None, DEFAULT_TIMEOUT)
    }
}

impl ChatBackend for TrialAdapter {
    // The server holds the credential; the trial is always available.
    fn is_ready(&self) -> bool {
        true
    }

    async fn chat(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&TrialRequest { messages })
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        let status = response.status();

        // Headers first; body values win below when present.
        self.update_status(
            Self::header_u64(response.headers(), "x-ratelimit-remaining").map(|v| v as u32),
            Self::header_u64(response.headers(), "x-ratelimit-reset"),
        );

        let raw = response
            .text()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;
        let body: TrialResponse = serde_json::from_str(&raw).unwrap_or(TrialResponse {
            message: None,
            error: None,
            remaining: None,
            reset_time: None,
        });

        self.update_status(body.remaining, body.reset_time);

        if status.as_u16() == 429 {
            let reset_at = body.reset_time.unwrap_or_default();
            let message = body.message.or(body.error).unwrap_or_else(|| {
                "Free trial limit reached. Please upgrade or use your own API key.".to_string()
            });
            return Err(Error::QuotaExceeded { reset_at, message });
        }

        if !status.is_success() {
            let detail = body.message.or(body.error).unwrap_or(raw);
            return Err(Error::Upstream {
                status: status.as_u16(),
                body: detail,
            });
        }

        Ok(body.message.unwrap_or_default())
    }
}
