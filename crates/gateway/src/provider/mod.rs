//! Provider adapters.
//!
//! Each adapter normalizes one chat backend to the same contract: build it
//! with credentials, ask [`ChatBackend::is_ready`], send an ordered message
//! sequence, get plain text back. No adapter retries; one call is one
//! upstream attempt.

mod anthropic;
mod trial;
mod worker;

pub use anthropic::{AnthropicAdapter, AnthropicAdapterBuilder};
pub use trial::{QuotaStatus, TrialAdapter};
pub use worker::{DEFAULT_WORKER_URL, WorkerAdapter};

use crate::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Splits the system turn from the conversation.
///
/// The first system message (if any) is taken out-of-band for providers that
/// carry it as a distinguished field; every system message is removed from
/// the returned turns.
pub(crate) fn split_system(messages: &[ChatMessage]) -> (Option<&str>, Vec<&ChatMessage>) {
    let system = messages
        .iter()
        .find(|m| m.role == Role::System)
        .map(|m| m.content.as_str());
    let turns = messages.iter().filter(|m| m.role != Role::System).collect();
    (system, turns)
}

/// Common adapter contract.
pub trait ChatBackend: Send + Sync {
    /// Whether the adapter holds valid credentials/endpoint for a call.
    fn is_ready(&self) -> bool;

    /// Send the conversation and return the normalized response text.
    fn chat(&self, messages: &[ChatMessage]) -> impl Future<Output = Result<String>> + Send;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_system_takes_first_system_turn() {
        let messages = [
            ChatMessage::system("be helpful"),
            ChatMessage::user("hi"),
            ChatMessage::system("ignored second system"),
            ChatMessage::assistant("hello"),
        ];

        let (system, turns) = split_system(&messages);
        assert_eq!(system, Some("be helpful"));
        assert_eq!(turns.len(), 2);
        assert!(turns.iter().all(|m| m.role != Role::System));
    }

    #[test]
    fn split_system_without_system_turn() {
        let messages = [ChatMessage::user("hi")];
        let (system, turns) = split_system(&messages);
        assert_eq!(system, None);
        assert_eq!(turns.len(), 1);
    }
}
