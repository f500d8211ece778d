//! Error types for the measurement engine.

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // Transfer errors, absorbed per stream by the measurers
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("transfer timed out after {0} ms")]
    Timeout(u64),

    #[error("transfer failed: {0}")]
    Transfer(String),

    // Run control
    #[error("run cancelled")]
    Cancelled,

    #[error("measurement task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("run did not complete")]
    Incomplete,

    // Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
