//! Result shapes shared by every [`crate::MemoryBackend`] implementation
//! (spec §4.C). All operations return one of these instead of throwing —
//! "no exceptions across the interface" (spec §7 policy).

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result of [`crate::MemoryBackend::get_tree`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeResult {
    /// Always `"tree"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Path the tree was rooted at (empty string for the root).
    pub path: String,
    /// Nested mapping of child name to either a sub-tree object or a leaf
    /// marker. Depth-cut subtrees are represented by the sentinel
    /// `{"...": true}` object (spec §6 "depth-cut subtrees").
    pub items: Value,
    /// Whether the traversal succeeded.
    pub success: bool,
    /// Error description, set iff `!success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TreeResult {
    /// An error result for a failed tree read at `path`.
    #[must_use]
    pub fn failure(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self { kind: "tree".to_string(), path: path.into(), items: Value::Object(Default::default()), success: false, error: Some(error.into()) }
    }
}

/// Result of [`crate::MemoryBackend::read`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResult {
    /// `"file"`, `"directory"`, or `"error"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Path that was read.
    pub path: String,
    /// File contents, present iff `kind == "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Entry metadata, present iff `kind == "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Immediate child names, present iff `kind == "directory"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<String>>,
    /// Whether the read succeeded.
    pub success: bool,
    /// Error description, set iff `!success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ReadResult {
    /// An error result for a missing or unreadable path.
    #[must_use]
    pub fn failure(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            path: path.into(),
            content: None,
            metadata: None,
            items: None,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Result of [`crate::MemoryBackend::write`] and
/// [`crate::MemoryBackend::delete`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// Path that was written or deleted.
    pub path: String,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Human-facing confirmation, set iff `success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Error description, set iff `!success`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResult {
    /// A successful write/delete result.
    #[must_use]
    pub fn ok(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { path: path.into(), success: true, message: Some(message.into()), error: None }
    }

    /// A failed write/delete result.
    #[must_use]
    pub fn failure(path: impl Into<String>, error: impl Into<String>) -> Self {
        Self { path: path.into(), success: false, message: None, error: Some(error.into()) }
    }
}

/// One hit from [`crate::MemoryBackend::search`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Entry path that matched.
    pub path: String,
    /// Context around the match.
    pub snippet: String,
    /// Relevance score; higher is better. Substring search uses a coarse
    /// scale (spec §4.C: "substring match is sufficient").
    pub score: f64,
}

/// Result of [`crate::MemoryBackend::health_check`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    /// Whether the backend is reachable and serving.
    pub healthy: bool,
    /// Human-facing status line.
    pub message: String,
    /// Backend-specific extra details.
    pub details: Value,
}

/// Per-entry metadata (spec §3 "Memory Entry").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    /// RFC 3339 timestamp set on first write; never changes after.
    pub created: String,
    /// RFC 3339 timestamp set on every write.
    pub updated: String,
    /// Starts at 1; incremented on every write.
    pub version: u64,
    /// Caller-supplied extra fields, merged in on every write.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// On-disk / on-wire shape of a single entry: `{content, metadata}`
/// (spec §6 "Persistent state layout").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    /// Entry body.
    pub content: String,
    /// Entry metadata.
    pub metadata: EntryMetadata,
}
