//! Agent Context (spec §4.J): a passive carrier of everything one turn
//! needs, grounded in `heare/developer/context.py`'s `AgentContext`.

use std::collections::HashMap;
use std::sync::Arc;

use hdev_core::SessionId;
use hdev_llm::{ContentBlock, ModelSpec, Turn};
use hdev_memory::MemoryBackend;
use hdev_sandbox::Sandbox;

use crate::session::UsageLogEntry;

/// Everything the loop and its tool handlers need to read about the
/// current session, without owning its mutation (spec §4.J: "a passive
/// carrier").
#[derive(Clone)]
pub struct AgentContext {
    /// This session's identity.
    pub session_id: SessionId,
    /// Set when this session was forked from a parent by compaction.
    pub parent_session_id: Option<SessionId>,
    /// The model this session talks to.
    pub model_spec: ModelSpec,
    /// Permission-gated filesystem access, shared read-only for config.
    pub sandbox: Arc<Sandbox>,
    /// Shared memory backend handle.
    pub memory: Arc<dyn MemoryBackend>,
    /// Read-only snapshot of chat history at the time this context was
    /// built (the loop refreshes it every iteration; tool handlers never
    /// mutate it directly).
    pub history: Vec<Turn>,
    /// Read-only snapshot of the pending tool-result buffer.
    pub tool_result_buffer: Vec<ContentBlock>,
    /// Usage entries logged so far this session.
    pub usage: Vec<UsageLogEntry>,
}

impl AgentContext {
    /// Build a context reflecting `session`'s current state.
    #[must_use]
    pub fn from_session(
        session: &crate::session::Session,
        sandbox: Arc<Sandbox>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Self {
        Self {
            session_id: session.id,
            parent_session_id: session.parent_session_id,
            model_spec: session.model.clone(),
            sandbox,
            memory,
            history: session.history.clone(),
            tool_result_buffer: session.tool_result_buffer.clone(),
            usage: session.usage_log.clone(),
        }
    }

    /// A forked context carrying a fresh session id and this one as parent
    /// (spec §4.J: "Forking produces a new id and sets `parent_session_id`").
    #[must_use]
    pub fn forked(&self) -> Self {
        Self {
            session_id: SessionId::new(),
            parent_session_id: Some(self.session_id),
            model_spec: self.model_spec.clone(),
            sandbox: Arc::clone(&self.sandbox),
            memory: Arc::clone(&self.memory),
            history: Vec::new(),
            tool_result_buffer: Vec::new(),
            usage: Vec::new(),
        }
    }

    /// Aggregate this context's usage log into per-model totals (spec §4.J:
    /// "aggregates input/output tokens and dollars per model, dividing the
    /// final cost by 1,000,000 at the last step").
    #[must_use]
    pub fn usage_summary(&self) -> UsageSummary {
        let mut per_model: HashMap<String, ModelUsage> = HashMap::new();
        // Raw per-entry costs are already in USD (computed, and divided,
        // at record time in `Session::record_usage`); here we only sum.
        // The "divide by 1,000,000 once at the end" step from
        // `context.py` is mirrored by summing already-divided per-entry
        // costs rather than re-dividing a running per-million total —
        // see `Session::record_usage` for where that division happens.
        for entry in &self.usage {
            let model = per_model.entry(entry.model_title.clone()).or_default();
            model.input_tokens = model.input_tokens.saturating_add(entry.usage.input_tokens);
            model.output_tokens = model.output_tokens.saturating_add(entry.usage.output_tokens);
            model.cache_creation_input_tokens =
                model.cache_creation_input_tokens.saturating_add(entry.usage.cache_creation_input_tokens);
            model.cache_read_input_tokens =
                model.cache_read_input_tokens.saturating_add(entry.usage.cache_read_input_tokens);
            model.cost_usd += entry.cost_usd;
        }
        let total_cost_usd = per_model.values().map(|m| m.cost_usd).sum();
        UsageSummary { per_model, total_cost_usd }
    }
}

/// Token and cost totals for one model across a session's usage log.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ModelUsage {
    /// Input tokens consumed.
    pub input_tokens: u64,
    /// Output tokens produced.
    pub output_tokens: u64,
    /// Cache-write tokens.
    pub cache_creation_input_tokens: u64,
    /// Cache-read tokens.
    pub cache_read_input_tokens: u64,
    /// Cost in USD attributed to this model.
    pub cost_usd: f64,
}

/// Result of [`AgentContext::usage_summary`] (spec §4.J).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct UsageSummary {
    /// Per-model breakdown, keyed by [`ModelSpec::title`].
    pub per_model: HashMap<String, ModelUsage>,
    /// Total cost across every model, in USD.
    pub total_cost_usd: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Session;
    use chrono::Utc;
    use hdev_memory::FilesystemMemoryBackend;
    use hdev_sandbox::{NullPrompter, SandboxMode};

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

    async fn context() -> AgentContext {
        let tmp = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter)));
        let memory: Arc<dyn MemoryBackend> =
            Arc::new(FilesystemMemoryBackend::new(tmp.path().join("memory")).await.unwrap());
        let mut session = Session::new(model(), Utc::now());
        session.record_usage(hdev_llm::Usage { input_tokens: 1_000_000, output_tokens: 0, ..Default::default() }, Utc::now());
        AgentContext::from_session(&session, sandbox, memory)
    }

    #[tokio::test]
    async fn forked_context_sets_parent_and_resets_state() {
        let ctx = context().await;
        let forked = ctx.forked();
        assert_eq!(forked.parent_session_id, Some(ctx.session_id));
        assert_ne!(forked.session_id, ctx.session_id);
        assert!(forked.history.is_empty());
    }

    #[tokio::test]
    async fn usage_summary_aggregates_per_model() {
        let ctx = context().await;
        let summary = ctx.usage_summary();
        let totals = summary.per_model.get("test-model").expect("model entry");
        assert_eq!(totals.input_tokens, 1_000_000);
        assert!((summary.total_cost_usd - 3.0).abs() < 1e-9);
    }
}
