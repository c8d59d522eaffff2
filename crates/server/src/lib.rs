//! Free-trial backend endpoint.
//!
//! Serves `POST /api/ai`: runs the admission gate against the caller's
//! derived identity, then forwards the conversation to the upstream LLM with
//! the server-held credential. Quota metadata travels in both the JSON body
//! and `X-RateLimit-*` headers so thin clients can read either.

mod config;
mod error;
mod routes;
mod state;

pub use config::ServerConfig;
pub use error::{Error, Result};
pub use state::{AppState, app};

use std::sync::Arc;

/// Bind and serve the trial endpoint until the process exits.
pub async fn serve(config: ServerConfig) -> Result<()> {
    let addr = config.addr.clone();
    let state = Arc::new(AppState::new(&config));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
    tracing::info!(%addr, limit = config.quota.limit, "trial endpoint listening");

    axum::serve(listener, app(state)).await?;
    Ok(())
}
