//! Generation and cache errors

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while generating a response
///
/// The `Display` output is the user-facing message carried by
/// [`GenerationResult`](crate::ports::GenerationResult).
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The prompt was empty; no I/O was attempted
    #[error("prompt cannot be empty")]
    EmptyPrompt,

    /// The request did not complete within the configured timeout
    #[error("request timed out: LLM service took too long to respond")]
    Timeout,

    /// The generation service could not be reached
    #[error("connection error: could not connect to LLM service")]
    Connection,

    /// The generation service answered with a non-200 status
    #[error("HTTP error {status}: {body}")]
    Http {
        /// Numeric HTTP status code
        status: u16,
        /// Response body as returned by the server
        body: String,
    },

    /// The stream finished without producing any text
    #[error("no response generated")]
    NoResponse,

    /// Any other failure during the network phase
    #[error("error generating response: {0}")]
    Other(String),
}

impl GenerationError {
    /// Whether the failure happened before any network I/O
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::EmptyPrompt)
    }

    /// Whether the failure was caused by the transport (timeout or connect)
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Timeout | Self::Connection)
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection
        } else {
            Self::Other(err.to_string())
        }
    }
}

impl From<std::io::Error> for GenerationError {
    /// Body reads go through an `io::Error` adapter; recover the
    /// underlying reqwest error so timeouts keep their classification.
    fn from(err: std::io::Error) -> Self {
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<reqwest::Error>())
        {
            return match err.into_inner().map(|inner| inner.downcast::<reqwest::Error>()) {
                Some(Ok(reqwest_err)) => Self::from(*reqwest_err),
                _ => Self::Other("response stream failed".to_string()),
            };
        }

        if err.kind() == std::io::ErrorKind::TimedOut {
            Self::Timeout
        } else {
            Self::Other(err.to_string())
        }
    }
}

/// Errors raised while setting up the response cache
///
/// Reads and writes never surface errors; only construction can fail.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The cache directory could not be created
    #[error("Failed to create cache directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
