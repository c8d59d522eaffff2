//! The `/api/ai` handler.
//!
//! Order matters and mirrors the deployed behavior: the admission gate runs
//! before the body is parsed, so a malformed request from an admitted caller
//! still spends a slot. Wire bodies and `X-RateLimit-*` headers are part of
//! the contract the trial adapter reads back.

use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use gateway::{ChatMessage, FALLBACK_IDENTITY, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_SYSTEM_PROMPT: &str = "You are an expert Python sensei.";

#[derive(Debug, Serialize)]
struct ChatOk {
    message: String,
    remaining: u32,
    #[serde(rename = "resetTime")]
    reset_time: u64,
}

#[derive(Debug, Serialize)]
struct QuotaExceededBody {
    error: &'static str,
    message: String,
    remaining: u32,
    #[serde(rename = "resetTime")]
    reset_time: u64,
}

#[derive(Debug, Serialize)]
struct UpgradeRequiredBody {
    error: &'static str,
    message: &'static str,
    #[serde(rename = "needsUpgrade")]
    needs_upgrade: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
}

#[derive(Debug, Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: String,
    messages: Vec<&'a ChatMessage>,
}

#[derive(Debug, Deserialize)]
struct UpstreamResponse {
    #[serde(default)]
    content: Vec<UpstreamBlock>,
}

#[derive(Debug, Deserialize)]
struct UpstreamBlock {
    #[serde(default)]
    text: String,
}

/// Identity used to bucket quota, derived from forwarding headers.
///
/// Precedence: first comma-separated `x-forwarded-for` value (trimmed),
/// then `x-real-ip`, then a constant fallback. This decides who shares a
/// bucket behind proxies, so it must not change.
fn client_identity(headers: &HeaderMap) -> String {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if !forwarded.is_empty() {
            return forwarded
                .split(',')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        }
    }
    if let Some(real) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real.is_empty() {
            return real.to_string();
        }
    }
    FALLBACK_IDENTITY.to_string()
}

fn rate_limit_headers(limit: u32, remaining: u32, reset_at: u64) -> [(&'static str, String); 3] {
    [
        ("x-ratelimit-limit", limit.to_string()),
        ("x-ratelimit-remaining", remaining.to_string()),
        ("x-ratelimit-reset", reset_at.to_string()),
    ]
}

fn bad_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: "Invalid request: messages array required",
        }),
    )
        .into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorBody {
            error: "Internal server error",
        }),
    )
        .into_response()
}

pub(crate) async fn ai_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let identity = client_identity(&headers);
    let decision = state.limiter.check(&identity);
    let limit = state.limiter.limit();

    if !decision.allowed {
        let minutes = decision
            .reset_at
            .saturating_sub(state.limiter.now_ms())
            .div_ceil(60_000);
        tracing::info!(%identity, reset_at = decision.reset_at, "trial limit reached");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            rate_limit_headers(limit, 0, decision.reset_at),
            Json(QuotaExceededBody {
                error: "Free trial limit reached",
                message: format!(
                    "You've used all {limit} free requests. Trial resets in {minutes} minutes, \
                     or upgrade for unlimited access."
                ),
                remaining: 0,
                reset_time: decision.reset_at,
            }),
        )
            .into_response();
    }

    let Ok(payload) = serde_json::from_slice::<Value>(&body) else {
        return internal_error();
    };
    let messages: Vec<ChatMessage> = match payload.get("messages") {
        Some(value) if value.is_array() => match serde_json::from_value(value.clone()) {
            Ok(messages) => messages,
            Err(_) => return bad_request(),
        },
        _ => return bad_request(),
    };

    let Some(api_key) = state.api_key.as_deref() else {
        tracing::error!("upstream API key not configured");
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(UpgradeRequiredBody {
                error: "API key required",
                message: "Free trial requires server configuration. Please add your Anthropic \
                          API key to continue, or sign up for a paid plan for instant access.",
                needs_upgrade: true,
            }),
        )
            .into_response();
    };

    // System turn travels out-of-band; the rest is the conversation.
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.clone())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let turns: Vec<&ChatMessage> = messages.iter().filter(|m| m.role != Role::System).collect();

    let request = UpstreamRequest {
        model: &state.model,
        max_tokens: state.max_tokens,
        system,
        messages: turns,
    };

    let response = match state
        .http
        .post(&state.upstream_url)
        .header("content-type", "application/json")
        .header("x-api-key", api_key)
        .header("anthropic-version", ANTHROPIC_VERSION)
        .json(&request)
        .send()
        .await
    {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "upstream request failed");
            return internal_error();
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        tracing::error!(%status, %detail, "upstream API error");
        let code =
            StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (
            code,
            Json(ErrorBody {
                error: "AI service error",
            }),
        )
            .into_response();
    }

    let parsed: UpstreamResponse = match response.json().await {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::error!(error = %e, "unreadable upstream response");
            return internal_error();
        }
    };
    let message = parsed
        .content
        .into_iter()
        .next()
        .map(|block| block.text)
        .unwrap_or_default();

    (
        StatusCode::OK,
        rate_limit_headers(limit, decision.remaining, decision.reset_at),
        Json(ChatOk {
            message,
            remaining: decision.remaining,
            reset_time: decision.reset_at,
        }),
    )
        .into_response()
}
