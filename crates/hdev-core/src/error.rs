//! Crate-boundary error type.
//!
//! Per §7 of the spec, no exception crosses the Memory Backend or Tool
//! Dispatcher boundary — those convert to structured result objects. This
//! enum is for the boundaries that *are* allowed to fail outwards: config
//! loading, session persistence, sandbox setup.

use thiserror::Error;

/// Errors surfaced by the runtime outside the structured-result boundaries.
#[derive(Debug, Error)]
pub enum HdevError {
    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// YAML (de)serialization failed.
    #[error("config error: {0}")]
    Yaml(String),

    /// Required environment/configuration value was missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The distinguished "do something else" permission response.
    ///
    /// Unwinds through the tool, through the dispatcher, up to the Agent
    /// Loop (§4.A / §4.I). Carries the operator's alternate instruction once
    /// collected by the front end; `None` while still propagating upward
    /// from the sandbox before the operator has supplied replacement text.
    #[error("operator requested a different action")]
    DoSomethingElse {
        /// The operator's replacement instruction, if already collected.
        alternate: Option<String>,
    },

    /// Operator-initiated cancellation (Ctrl+C) during tool dispatch.
    #[error("operation cancelled")]
    Cancelled,

    /// Catch-all for a subsystem-specific error rendered as text.
    #[error("{0}")]
    Other(String),
}

/// Result alias using [`HdevError`].
pub type HdevResult<T> = Result<T, HdevError>;
