//! Foundation types shared by every crate in the runtime.
//!
//! This crate provides:
//! - Session identity (`SessionId`)
//! - The common error enum returned at crate boundaries
//! - Home-directory resolution (`HdevHome`)
//! - A generic retry-with-backoff helper used to wrap transient LLM calls

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod dirs;
pub mod error;
pub mod retry;
pub mod types;

pub use dirs::HdevHome;
pub use error::{HdevError, HdevResult};
pub use retry::{RetryConfig, retry_with_backoff};
pub use types::SessionId;
