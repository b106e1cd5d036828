//! Wire-shaped types for the LLM transport contract (spec §6).
//!
//! The transport itself is "taken as given" (spec §1 Non-goals); these types
//! are the Rust shape of that contract, not a new protocol.

use serde::{Deserialize, Serialize};

/// Who produced a [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Operator input, or a `tool_result`/`mentioned_file` carrier turn.
    User,
    /// LLM output, possibly containing `tool_use` blocks.
    Assistant,
    /// A synthetic turn (compaction summaries; never sent verbatim by the
    /// operator).
    System,
}

/// One block of turn content (spec §3 "Turn" content-block variants).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Plain text.
    Text {
        /// The text itself.
        text: String,
    },
    /// An assistant-issued request to invoke a tool.
    ToolUse {
        /// Unique id, matched by the corresponding `tool_result`.
        id: String,
        /// Declared tool name.
        name: String,
        /// Arguments as a JSON object.
        input: serde_json::Value,
    },
    /// A user-role response to exactly one `tool_use`.
    ToolResult {
        /// The `tool_use` id this result answers.
        tool_use_id: String,
        /// Rendered tool output (or `"cancelled"`).
        content: String,
        /// Whether the tool itself reported failure.
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    /// An inlined `@file` mention (spec §4.I "@file inlining").
    MentionedFile {
        /// Sandbox-relative path as written in the `@`-token.
        path: String,
        /// File contents at the time of inlining.
        contents: String,
    },
}

impl ContentBlock {
    /// Shorthand for constructing a `text` block.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }

    /// The text of this block, if it is a `Text` variant.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A single turn in a [`Session`](hdev_core)'s history (spec §3 "Turn").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Who produced this turn.
    pub role: Role,
    /// Ordered content blocks.
    pub content: Vec<ContentBlock>,
}

impl Turn {
    /// A plain user turn with a single text block.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: vec![ContentBlock::text(text)] }
    }

    /// A plain assistant turn with a single text block.
    #[must_use]
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: vec![ContentBlock::text(text)] }
    }

    /// Concatenate every `Text` block's contents, ignoring other variants.
    #[must_use]
    pub fn text_only(&self) -> String {
        self.content.iter().filter_map(ContentBlock::as_text).collect::<Vec<_>>().join("")
    }

    /// All `tool_use` blocks in this turn, in order.
    pub fn tool_uses(&self) -> impl Iterator<Item = (&str, &str, &serde_json::Value)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }
}

/// Why the LLM stopped generating (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Normal completion.
    EndTurn,
    /// Hit the configured output token ceiling.
    MaxTokens,
    /// The assistant turn contains one or more `tool_use` blocks.
    ToolUse,
    /// A configured stop sequence was produced.
    StopSequence,
}

/// Token accounting for one LLM call (spec §6: "input tokens, output tokens,
/// cache-creation input tokens, cache-read input tokens").
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Tokens in the request that were not served from cache.
    pub input_tokens: u64,
    /// Tokens generated in the response.
    pub output_tokens: u64,
    /// Tokens written into the prompt cache by this call.
    #[serde(default)]
    pub cache_creation_input_tokens: u64,
    /// Tokens served from the prompt cache.
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

impl Usage {
    /// Sum of every token field; used for usage-log totals.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.cache_creation_input_tokens)
            .saturating_add(self.cache_read_input_tokens)
    }
}

/// Static per-million pricing and context limits for one model (spec §3
/// "Session" entity).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSpec {
    /// Human-facing model name.
    pub title: String,
    /// API identifier sent on the wire.
    pub api_name: String,
    /// Maximum tokens the model will emit in one response.
    pub max_output_tokens: u64,
    /// Total context window, in tokens.
    pub context_window: u64,
    /// Price per million input tokens, in USD.
    pub input_price_per_million: f64,
    /// Price per million output tokens, in USD.
    pub output_price_per_million: f64,
    /// Price per million cache-write tokens, in USD.
    pub cache_write_price_per_million: f64,
    /// Price per million cache-read tokens, in USD.
    pub cache_read_price_per_million: f64,
}

/// One declared tool's wire schema (spec §4.G "Schema generation"), sent
/// alongside every LLM call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name, matched against `tool_use.name` on invocation.
    pub name: String,
    /// Human description (first paragraph of the handler's docs).
    pub description: String,
    /// JSON Schema object: `{ type: "object", properties, required }`.
    pub input_schema: serde_json::Value,
    /// Set on the *last* schema in the list when prompt caching is enabled
    /// (spec §4.G "ephemeral cache hint").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_control: Option<CacheControl>,
}

/// Prompt-cache breakpoint marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheControl {
    /// Always `"ephemeral"` for the one cache type this transport supports.
    #[serde(rename = "type")]
    pub kind: CacheControlKind,
}

/// The only cache-control kind this transport contract defines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheControlKind {
    /// Single-response cache breakpoint.
    Ephemeral,
}

/// A fully accumulated LLM response (spec §6 "Final message exposes").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    /// Ordered content blocks, mirroring [`Turn::content`].
    pub content: Vec<ContentBlock>,
    /// Why generation stopped.
    pub stop_reason: StopReason,
    /// Token accounting for this call.
    pub usage: Usage,
}

impl LlmResponse {
    /// Convenience: wrap [`Self::content`] into an assistant [`Turn`].
    #[must_use]
    pub fn into_turn(self) -> Turn {
        Turn { role: Role::Assistant, content: self.content }
    }

    /// Whether this response contains any `tool_use` block.
    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        self.content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }))
    }
}

/// One chunk of a streamed response (spec §6 "Streamed chat completions").
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Partial text token for the in-progress `Text` block.
    TextDelta(String),
    /// A `tool_use` block has started accumulating.
    ToolUseStart {
        /// The block's id.
        id: String,
        /// The tool being invoked.
        name: String,
    },
    /// Partial JSON for the in-progress `tool_use` block's `input`.
    ToolUseDelta {
        /// The block's id, matching a prior `ToolUseStart`.
        id: String,
        /// Raw partial JSON text; concatenate and parse once complete.
        partial_json: String,
    },
    /// Final accumulated message, including `stop_reason` and `usage`.
    MessageComplete(LlmResponse),
    /// The stream ended with a transport-level error.
    Error(String),
}
