//! The Session entity (spec §3 "Session").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hdev_core::SessionId;
use hdev_llm::{ContentBlock, ModelSpec, Turn, Usage};

/// One entry in a session's append-only usage log (spec §3: "`(token-counts,
/// model-spec)` pairs").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageLogEntry {
    /// When this call completed.
    pub recorded_at: DateTime<Utc>,
    /// The model that produced it.
    pub model_title: String,
    /// Token accounting for the call.
    pub usage: Usage,
    /// Cost in USD, computed from `usage` and the model's per-million
    /// prices at the time of the call.
    pub cost_usd: f64,
}

/// A long-lived conversation with the LLM (spec §3 "Session").
///
/// Owns its chat history, tool-result buffer, and usage log exclusively —
/// no other component mutates them directly (spec §3 "Ownership").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Fresh unique identity.
    pub id: SessionId,
    /// Set when this session was forked from a parent by compaction.
    pub parent_session_id: Option<SessionId>,
    /// The model this session talks to.
    pub model: ModelSpec,
    /// Ordered sequence of turns exchanged so far.
    pub history: Vec<Turn>,
    /// Pending `tool_result` (and `mentioned_file`) blocks waiting to be
    /// folded into the next user turn.
    pub tool_result_buffer: Vec<ContentBlock>,
    /// Append-only usage log, one entry per completed LLM call.
    pub usage_log: Vec<UsageLogEntry>,
    /// When this session was created.
    pub created_at: DateTime<Utc>,
    /// Number of user-initiated turns run so far (not ported from spec.md;
    /// supplemented from `astrid-runtime`'s `SessionMetadata`).
    pub turn_count: u64,
    /// Number of tool calls dispatched so far, across all turns.
    pub tool_call_count: u64,
}

impl Session {
    /// Start a fresh, empty session for `model`.
    #[must_use]
    pub fn new(model: ModelSpec, created_at: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::new(),
            parent_session_id: None,
            model,
            history: Vec::new(),
            tool_result_buffer: Vec::new(),
            usage_log: Vec::new(),
            created_at,
            turn_count: 0,
            tool_call_count: 0,
        }
    }

    /// Record one completed LLM call's usage against this session's model
    /// pricing (spec §3 "usage log").
    pub fn record_usage(&mut self, usage: Usage, recorded_at: DateTime<Utc>) {
        let cost_usd = cost_per_million(&self.model, usage);
        self.usage_log.push(UsageLogEntry { recorded_at, model_title: self.model.title.clone(), usage, cost_usd });
    }

    /// Total cost across every logged call, in USD (spec §4.J
    /// `usage_summary`: divide by 1,000,000 once, at the end).
    #[must_use]
    pub fn total_cost_usd(&self) -> f64 {
        self.usage_log.iter().map(|entry| entry.cost_usd).sum::<f64>()
    }

    /// Drain the pending tool-result buffer into a single new user turn,
    /// ready to append to `history`. No-op (returns `None`) if nothing is
    /// pending.
    pub fn take_tool_results_as_user_turn(&mut self) -> Option<Turn> {
        if self.tool_result_buffer.is_empty() {
            return None;
        }
        let content = std::mem::take(&mut self.tool_result_buffer);
        Some(Turn { role: hdev_llm::Role::User, content })
    }
}

/// Raw per-million cost for one call, not yet divided into a per-token rate
/// (spec §4.J `context.py`: costs accumulate in per-million units, the
/// divide-by-1,000,000 happens once at the very end). Here each `Session`
/// divides per-call since it tracks a running total rather than a
/// cross-session rollup; [`crate::context::UsageSummary`] is where the
/// single end-of-aggregation division (spec §4.J) actually happens across
/// sessions.
#[allow(clippy::cast_precision_loss)]
fn cost_per_million(model: &ModelSpec, usage: Usage) -> f64 {
    let input = usage.input_tokens as f64 * model.input_price_per_million;
    let output = usage.output_tokens as f64 * model.output_price_per_million;
    let cache_write = usage.cache_creation_input_tokens as f64 * model.cache_write_price_per_million;
    let cache_read = usage.cache_read_input_tokens as f64 * model.cache_read_price_per_million;
    (input + output + cache_write + cache_read) / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelSpec {
        ModelSpec {
            title: "test-model".to_string(),
            api_name: "test-model-v1".to_string(),
            max_output_tokens: 8192,
            context_window: 200_000,
            input_price_per_million: 3.0,
            output_price_per_million: 15.0,
            cache_write_price_per_million: 3.75,
            cache_read_price_per_million: 0.3,
        }
    }

    #[test]
    fn new_session_has_no_parent_and_empty_state() {
        let session = Session::new(model(), Utc::now());
        assert!(session.parent_session_id.is_none());
        assert!(session.history.is_empty());
        assert!(session.tool_result_buffer.is_empty());
    }

    #[test]
    fn record_usage_accumulates_cost() {
        let mut session = Session::new(model(), Utc::now());
        session.record_usage(Usage { input_tokens: 1_000_000, output_tokens: 0, ..Default::default() }, Utc::now());
        assert!((session.total_cost_usd() - 3.0).abs() < 1e-9);
    }

    #[test]
    fn new_session_has_zeroed_counters() {
        let session = Session::new(model(), Utc::now());
        assert_eq!(session.turn_count, 0);
        assert_eq!(session.tool_call_count, 0);
    }

    #[test]
    fn draining_empty_buffer_returns_none() {
        let mut session = Session::new(model(), Utc::now());
        assert!(session.take_tool_results_as_user_turn().is_none());
    }

    #[test]
    fn draining_buffer_produces_user_turn_and_clears_it() {
        let mut session = Session::new(model(), Utc::now());
        session.tool_result_buffer.push(ContentBlock::ToolResult {
            tool_use_id: "t1".to_string(),
            content: "ok".to_string(),
            is_error: false,
        });
        let turn = session.take_tool_results_as_user_turn().expect("turn");
        assert_eq!(turn.role, hdev_llm::Role::User);
        assert_eq!(turn.content.len(), 1);
        assert!(session.tool_result_buffer.is_empty());
    }
}
