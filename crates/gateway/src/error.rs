use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no AI provider configured")]
    NotConfigured,

    #[error("{message}")]
    QuotaExceeded {
        /// Epoch milliseconds at which the free-tier window resets.
        reset_at: u64,
        /// Human-readable explanation, including the minutes until reset.
        message: String,
    },

    #[error("upstream error {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),
}

pub type Result<T> = std::result::Result<T, Error>;
