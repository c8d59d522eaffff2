//! AI provider gateway: routing, adapters, and free-tier admission.
//!
//! This crate sits between a chat UI and several interchangeable LLM
//! backends, unifying them behind one interface:
//!
//! - **[`ProviderRouter`]**: holds the selected [`ProviderConfig`] and
//!   dispatches `chat` calls to the matching adapter.
//! - **Adapters** ([`provider`]): one per backend (a direct-key Anthropic
//!   client, the server-credentialed free trial, and a third-party relay
//!   worker). Each normalizes requests and responses to [`ChatMessage`] in,
//!   plain text out.
//! - **[`RateLimiter`]** ([`quota`]): fixed-window admission control the
//!   trial backend runs before forwarding upstream.
//!
//! # Example
//!
//! ```ignore
//! use gateway::{ChatMessage, ProviderConfig, ProviderRouter};
//!
//! # async fn example() -> gateway::Result<()> {
//! let mut router = ProviderRouter::new();
//! router.configure(ProviderConfig::DirectKey {
//!     secret_key: "sk-ant-api01-...".into(),
//! });
//!
//! let reply = router
//!     .chat(&[
//!         ChatMessage::system("You are an expert Python sensei."),
//!         ChatMessage::user("Explain list comprehensions."),
//!     ])
//!     .await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

mod error;
pub mod provider;
pub mod quota;
mod router;

pub use error::{Error, Result};
pub use provider::{
    AnthropicAdapter, ChatBackend, ChatMessage, DEFAULT_WORKER_URL, QuotaStatus, Role,
    TrialAdapter, WorkerAdapter,
};
pub use quota::{
    BoundedStore, Clock, DEFAULT_LIMIT, DEFAULT_WINDOW, Decision, FALLBACK_IDENTITY, QuotaConfig,
    QuotaRecord, QuotaStore, RateLimiter, SystemClock,
};
pub use router::{ProviderConfig, ProviderRouter, RouterOptions};
