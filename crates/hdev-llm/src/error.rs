//! Transport-boundary errors.

use thiserror::Error;

/// Errors surfaced by an [`crate::LlmClient`] implementation.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Transport-level failure (connect, timeout, TLS, etc).
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),
    /// Response body did not parse as the expected JSON shape.
    #[error("malformed response: {0}")]
    Serde(#[from] serde_json::Error),
    /// The API returned a non-2xx status with a structured error body.
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Provider-supplied error message.
        message: String,
    },
    /// The stream ended mid-block or produced an event outside the expected
    /// grammar.
    #[error("stream protocol error: {0}")]
    Stream(String),
}

impl LlmError {
    /// Whether this failure is worth retrying (spec §7 "Transient LLM").
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Api { status, .. } => {
                matches!(*status, 429 | 500 | 503 | 529)
            }
            LlmError::Http(e) => e.is_timeout() || e.is_connect(),
            LlmError::Serde(_) | LlmError::Stream(_) => false,
        }
    }
}
