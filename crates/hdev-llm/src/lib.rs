//! LLM transport types and client (spec §6 "External interfaces", taken as
//! given; this crate is the Rust shape of that contract, ground in
//! `astrid-llm`).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod client;
mod error;
mod types;

pub use client::{AnthropicClient, ChatRequest, EventStream, LlmClient};
pub use error::LlmError;
pub use types::{
    CacheControl, CacheControlKind, ContentBlock, LlmResponse, ModelSpec, Role, StopReason, StreamEvent,
    ToolSchema, Turn, Usage,
};
