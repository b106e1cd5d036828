//! Errors surfaced by the Agent Loop itself (spec §4.I).

use thiserror::Error;

/// Failures that can end a turn early. Distinguished from the structured
/// results returned by the Memory Backend and Tool Dispatcher (spec §7:
/// "no exceptions across those boundaries") — these *do* propagate, because
/// the loop has nowhere further to delegate them.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The configured LLM transport failed in a way retrying couldn't fix.
    #[error("LLM transport error: {0}")]
    Llm(#[from] hdev_llm::LlmError),

    /// Session persistence (read or write) failed.
    #[error("session persistence error: {0}")]
    Persistence(#[from] hdev_core::HdevError),

    /// The operator chose "do something else" during tool dispatch, and it
    /// unwound past the point this loop knows how to recover from.
    #[error("operator requested a different action")]
    DoSomethingElse {
        /// The operator's replacement instruction, if collected.
        alternate: Option<String>,
    },
}

/// Result alias using [`RuntimeError`].
pub type RuntimeResult<T> = Result<T, RuntimeError>;
