//! CLI error types.

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or missing required fields.
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),

    /// An error from the provider gateway.
    #[error(transparent)]
    Gateway(#[from] gateway::Error),

    /// An error from the trial endpoint server.
    #[error(transparent)]
    Server(#[from] server::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
