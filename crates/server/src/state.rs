use crate::ServerConfig;
use crate::routes;
use axum::{Router, routing::post};
use gateway::{BoundedStore, RateLimiter, SystemClock};
use std::sync::Arc;

/// Shared state behind the trial endpoint.
pub struct AppState {
    pub limiter: RateLimiter,
    pub api_key: Option<String>,
    pub upstream_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            limiter: RateLimiter::with_parts(
                config.quota,
                Box::new(BoundedStore::new(config.store_capacity)),
                Arc::new(SystemClock),
            ),
            api_key: config.api_key.clone(),
            upstream_url: config.upstream_url.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            http: reqwest::Client::new(),
        }
    }
}

/// Build the API router over `state`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/ai", post(routes::ai_chat))
        .with_state(state)
}
