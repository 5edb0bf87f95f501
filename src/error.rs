//! Error types for probing and assessment

use thiserror::Error;

/// Failure of a single measurement round
///
/// The `Display` text is what ends up in a failed result's `detail`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbeError {
    /// The proxied HTTP client could not be built (e.g. unusable proxy URL)
    #[error("client error: {0}")]
    Client(String),

    /// Connection refused, DNS failure, broken body stream and friends
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request to {url} timed out")]
    Timeout { url: String },

    /// The server kept answering with a retryable status until retries ran out
    #[error("max retries exceeded for {url} (last status: {status})")]
    RetriesExhausted { url: String, status: u16 },
}

impl ProbeError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Timeout {
                url: url.to_string(),
            }
        } else if err.is_builder() {
            ProbeError::Client(err.to_string())
        } else {
            ProbeError::Transport(err.to_string())
        }
    }
}

/// Errors that abort a whole assessment run
#[derive(Debug, Error)]
pub enum AssessError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker task panicked or was cancelled
    #[error("worker failed: {0}")]
    Worker(String),
}
