//! The Agent Loop's turn state machine (spec §4.I).
//!
//! One call to [`AgentLoop::run_turn`] drives `Compose → SendingToLLM →
//! Evaluate → (Dispatching | MaxTokensContinuation)*` until the LLM returns
//! `end_turn`, the operator cancels tool dispatch, or (internally) the
//! operator chooses "do something else" and the loop rewinds and resends
//! without returning control to the caller — matching the state diagram in
//! spec §4.I exactly.
//!
//! Grounded in `heare/developer/agent.py`'s `process_response` dispatch on
//! `stop_reason`, generalized the way `astrid-runtime/src/runtime/mod.rs`
//! breaks a turn into named async steps instead of one long function.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use hdev_compact::{CompactionTransition, Compacter};
use hdev_llm::{ChatRequest, ContentBlock, LlmClient, LlmError, LlmResponse, ModelSpec, StopReason, StreamEvent};
use hdev_memory::MemoryBackend;
use hdev_sandbox::Sandbox;
use hdev_tools::{invoke_agent_tools, DispatchError, ToolCallRequest, ToolContext, ToolRegistry};

use hdev_core::retry::{retry_with_backoff, RetryConfig};

use crate::error::{RuntimeError, RuntimeResult};
use crate::mentions::inline_mentions;
use crate::persistence::SessionStore;
use crate::session::Session;
use crate::system_prompt::assemble_system_prompt;

/// Everything one loop instance needs besides the session it drives
/// (spec §4.J's collaborators, minus the parts that live on [`Session`]
/// itself).
pub struct AgentLoopDeps {
    /// The LLM transport.
    pub llm: Arc<dyn LlmClient>,
    /// Declared tools and their concurrency semaphores.
    pub tools: Arc<ToolRegistry>,
    /// Permission-gated filesystem access.
    pub sandbox: Arc<Sandbox>,
    /// Collaborators every tool handler needs.
    pub tool_context: ToolContext,
    /// Shared memory backend handle.
    pub memory: Arc<dyn MemoryBackend>,
    /// Context-window budgeting and summarization.
    pub compacter: Compacter,
    /// Whether the last tool schema carries an ephemeral cache breakpoint.
    pub enable_caching: bool,
    /// Token budget for the system prompt's file-tree section.
    pub system_prompt_tree_tokens: u64,
    /// Output token budget for compaction summaries.
    pub max_summary_tokens: u64,
}

/// What one [`AgentLoop::run_turn`] call produced (spec §4.I: the loop
/// either reaches `end_turn`, or is interrupted by the operator mid-dispatch;
/// "do something else" and `max_tokens` are handled internally and never
/// escape as an outcome).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The LLM reached `end_turn` (or produced a stop sequence); `text` is
    /// the assistant's final text content.
    EndTurn {
        /// Concatenated text content of the final assistant turn.
        text: String,
    },
    /// Operator Ctrl+C arrived during `Dispatching`; every outstanding
    /// `tool_use` in the interrupted batch now has a `"cancelled"` result
    /// queued, and the loop has returned to `AwaitingUserInput`.
    Cancelled,
}

/// Drives one [`Session`] through the turn state machine.
pub struct AgentLoop {
    session: Session,
    deps: AgentLoopDeps,
    store: Option<SessionStore>,
    last_compaction: Option<CompactionTransition>,
}

impl AgentLoop {
    /// Start a loop for `session` with the given collaborators. `store` is
    /// `None` in tests that don't exercise persistence.
    #[must_use]
    pub fn new(session: Session, deps: AgentLoopDeps, store: Option<SessionStore>) -> Self {
        Self { session, deps, store, last_compaction: None }
    }

    /// The session currently being driven (its id changes across a
    /// compaction fork mid-turn).
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// The compaction transition applied during the most recent
    /// [`Self::run_turn`] call, if any (spec §4.H "returned to the Agent
    /// Loop").
    #[must_use]
    pub fn last_compaction(&self) -> Option<&CompactionTransition> {
        self.last_compaction.as_ref()
    }

    /// Append `user_text` as a new user turn and drive the state machine
    /// until `end_turn` or an operator cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Llm`] if the transport fails in a way
    /// retrying can't fix, or [`RuntimeError::Persistence`] if session
    /// persistence fails.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn run_turn(&mut self, user_text: &str, cancel: CancellationToken) -> RuntimeResult<TurnOutcome> {
        self.session.history.push(hdev_llm::Turn::user_text(user_text));
        self.session.turn_count += 1;
        self.last_compaction = None;
        self.run_until_pause(cancel).await
    }

    /// Single-response mode (spec §4.I "If started with an initial prompt
    /// and a single-response flag, the loop runs exactly one Evaluate cycle
    /// to `end_turn` then exits"). Identical to [`Self::run_turn`]; kept as
    /// a distinct name so callers' intent is legible.
    pub async fn run_single_response(
        &mut self,
        user_text: &str,
        cancel: CancellationToken,
    ) -> RuntimeResult<TurnOutcome> {
        self.run_turn(user_text, cancel).await
    }

    async fn run_until_pause(&mut self, cancel: CancellationToken) -> RuntimeResult<TurnOutcome> {
        loop {
            // --- Compose ---
            if let Some(turn) = self.session.take_tool_results_as_user_turn() {
                self.session.history.push(turn);
            }
            inline_mentions(&mut self.session.history, &self.deps.sandbox).await;
            if let Some(transition) = self.maybe_compact().await? {
                self.last_compaction = Some(transition);
            }

            // --- SendingToLLM ---
            let system_prompt = assemble_system_prompt(&self.deps.sandbox, self.deps.system_prompt_tree_tokens);
            let tools_schema = self.deps.tools.all_schemas(self.deps.enable_caching);
            let request = ChatRequest {
                model: self.session.model.api_name.clone(),
                max_tokens: self.session.model.max_output_tokens,
                system: system_prompt,
                tools: tools_schema,
                messages: self.session.history.clone(),
                stream: true,
            };

            let response = self.send_with_retry(request).await.map_err(RuntimeError::Llm)?;
            self.session.record_usage(response.usage, Utc::now());
            self.session.history.push(response.clone().into_turn());
            self.persist().await?;

            // --- Evaluate ---
            match response.stop_reason {
                StopReason::EndTurn | StopReason::StopSequence => {
                    return Ok(TurnOutcome::EndTurn { text: response.into_turn().text_only() });
                }
                StopReason::MaxTokens => {
                    self.apply_max_tokens_continuation();
                }
                StopReason::ToolUse => {
                    if let Some(outcome) = self.dispatch_tool_calls(cancel.clone()).await? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    async fn send_with_retry(&self, request: ChatRequest) -> Result<LlmResponse, LlmError> {
        let llm = Arc::clone(&self.deps.llm);
        retry_with_backoff(
            RetryConfig::default(),
            move || {
                let llm = Arc::clone(&llm);
                let request = request.clone();
                async move { stream_and_accumulate(llm.as_ref(), request).await }
            },
            LlmError::is_retryable,
        )
        .await
    }

    /// spec §4.I `MaxTokensContinuation`: pop the just-added assistant
    /// turn; its partial text plus a continuation directive go into the
    /// tool-result buffer, which the next `Compose` folds into a fresh
    /// user turn.
    fn apply_max_tokens_continuation(&mut self) {
        let assistant_turn = self.session.history.pop().expect("Evaluate always follows a pushed assistant turn");
        let partial_text = assistant_turn.text_only();
        self.session.tool_result_buffer.push(ContentBlock::text(format!(
            "{partial_text}\n\n[Response truncated at the output token limit. Continue from where you left off.]"
        )));
    }

    /// spec §4.I `Dispatching`. Returns `Some(outcome)` when the turn must
    /// pause and hand control back to the caller (operator cancellation);
    /// returns `None` when the loop should continue straight back into
    /// `Compose` (normal completion, or "do something else").
    async fn dispatch_tool_calls(&mut self, cancel: CancellationToken) -> RuntimeResult<Option<TurnOutcome>> {
        let assistant_turn = self.session.history.last().expect("ToolUse implies a pushed assistant turn").clone();
        let calls: Vec<ToolCallRequest> = assistant_turn
            .tool_uses()
            .map(|(id, name, input)| ToolCallRequest { id: id.to_string(), name: name.to_string(), input: input.clone() })
            .collect();

        self.session.tool_call_count += calls.len() as u64;

        match invoke_agent_tools(&self.deps.tools, &self.deps.tool_context, calls, cancel).await {
            Ok(results) => {
                for result in results {
                    self.session.tool_result_buffer.push(ContentBlock::ToolResult {
                        tool_use_id: result.tool_use_id,
                        content: result.content,
                        is_error: result.is_error,
                    });
                }
                self.persist().await?;
                Ok(None)
            }
            Err(DispatchError::DoSomethingElse(alternate)) => {
                self.session.history.pop();
                if let Some(preceding) = self.session.history.last_mut() {
                    let alt_text = alternate.as_deref().unwrap_or("(no alternate instruction collected)");
                    preceding.content.push(ContentBlock::text(format!("\n\nAlternate request: {alt_text}")));
                }
                self.session.tool_result_buffer.clear();
                self.persist().await?;
                Ok(None)
            }
            Err(DispatchError::Cancelled) => {
                for (id, _, _) in assistant_turn.tool_uses() {
                    self.session.tool_result_buffer.push(ContentBlock::ToolResult {
                        tool_use_id: id.to_string(),
                        content: "cancelled".to_string(),
                        is_error: false,
                    });
                }
                self.persist().await?;
                Ok(Some(TurnOutcome::Cancelled))
            }
        }
    }

    /// spec §4.H: decide whether to compact before sending, and if so,
    /// persist the superseded session and switch to the forked one.
    async fn maybe_compact(&mut self) -> RuntimeResult<Option<CompactionTransition>> {
        let system_prompt = assemble_system_prompt(&self.deps.sandbox, self.deps.system_prompt_tree_tokens);
        let tools_schema = self.deps.tools.all_schemas(self.deps.enable_caching);
        let transition = self
            .deps
            .compacter
            .compact(
                self.deps.llm.as_ref(),
                self.session.id,
                &self.session.history,
                &system_prompt,
                &tools_schema,
                &self.session.model.api_name,
                self.session.model.context_window,
                self.deps.max_summary_tokens,
            )
            .await
            .map_err(RuntimeError::Llm)?;

        let Some(transition) = transition else { return Ok(None) };

        self.persist().await?;
        let model: ModelSpec = self.session.model.clone();
        let mut forked = Session::new(model, Utc::now());
        forked.id = transition.new_session_id;
        forked.parent_session_id = Some(transition.original_session_id);
        forked.history = transition.compacted_messages.clone();
        self.session = forked;
        Ok(Some(transition))
    }

    async fn persist(&self) -> RuntimeResult<()> {
        let Some(store) = &self.store else { return Ok(()) };
        let ctx = crate::context::AgentContext::from_session(
            &self.session,
            Arc::clone(&self.deps.sandbox),
            Arc::clone(&self.deps.memory),
        );
        store.save(&self.session, ctx.usage_summary()).await
    }
}

async fn stream_and_accumulate(llm: &dyn LlmClient, request: ChatRequest) -> Result<LlmResponse, LlmError> {
    let mut stream = llm.stream_turn(request).await?;
    while let Some(event) = stream.next().await {
        match event? {
            StreamEvent::MessageComplete(response) => return Ok(response),
            StreamEvent::Error(message) => return Err(LlmError::Stream(message)),
            _ => {}
        }
    }
    Err(LlmError::Stream("stream ended without a completed message".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream;
    use hdev_llm::{EventStream, Role, Usage};
    use hdev_memory::FilesystemMemoryBackend;
    use hdev_sandbox::{NullPrompter, SandboxMode};
    use hdev_shell::{NullShellPrompter, ShellRunner};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn model() -> ModelSpec {
        ModelSpec {
            title: "test-model".to_string(),
            api_name: "test-model-v1".to_string(),
            max_output_tokens: 1024,
            context_window: 200_000,
            input_price_per_million: 3.0,
            output_price_per_million: 15.0,
            cache_write_price_per_million: 3.75,
            cache_read_price_per_million: 0.3,
        }
    }

    /// A scripted transport: each call to `stream_turn` returns the next
    /// queued response; `count_tokens` always reports a tiny count so the
    /// compacter never triggers unless a test overrides it.
    struct ScriptedClient {
        responses: Mutex<Vec<LlmResponse>>,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn new(responses: Vec<LlmResponse>) -> Self {
            Self { responses: Mutex::new(responses), calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn stream_turn(&self, _request: ChatRequest) -> Result<EventStream, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut responses = self.responses.lock().unwrap();
            let response = if responses.is_empty() {
                LlmResponse { content: vec![], stop_reason: StopReason::EndTurn, usage: Usage::default() }
            } else {
                responses.remove(0)
            };
            Ok(Box::pin(stream::once(async move { Ok(StreamEvent::MessageComplete(response)) })))
        }

        async fn count_tokens(&self, _request: &ChatRequest) -> Result<u64, LlmError> {
            Ok(10)
        }
    }

    async fn harness(tmp: &tempfile::TempDir, responses: Vec<LlmResponse>) -> (AgentLoop, Arc<ScriptedClient>) {
        let sandbox = Arc::new(Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter)));
        let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(NullShellPrompter)));
        let tool_context = ToolContext::new(Arc::clone(&sandbox), shell);
        let memory: Arc<dyn MemoryBackend> =
            Arc::new(FilesystemMemoryBackend::new(tmp.path().join("memory")).await.unwrap());
        let llm = Arc::new(ScriptedClient::new(responses));

        let deps = AgentLoopDeps {
            llm: llm.clone(),
            tools: Arc::new(ToolRegistry::with_defaults()),
            sandbox,
            tool_context,
            memory,
            compacter: Compacter::default(),
            enable_caching: false,
            system_prompt_tree_tokens: 1_000,
            max_summary_tokens: 1_000,
        };
        let session = Session::new(model(), Utc::now());
        (AgentLoop::new(session, deps, None), llm)
    }

    #[tokio::test]
    async fn end_turn_returns_text_and_appends_two_turns() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut loop_, _llm) = harness(
            &tmp,
            vec![LlmResponse {
                content: vec![ContentBlock::text("hello world")],
                stop_reason: StopReason::EndTurn,
                usage: Usage::default(),
            }],
        )
        .await;

        let outcome = loop_.run_turn("hi", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::EndTurn { text: "hello world".to_string() });
        assert_eq!(loop_.session().history.len(), 2);
        assert_eq!(loop_.session().history[0].role, Role::User);
        assert_eq!(loop_.session().history[1].role, Role::Assistant);
        assert_eq!(loop_.session().turn_count, 1);
    }

    #[tokio::test]
    async fn max_tokens_continues_without_surfacing_to_caller() {
        let tmp = tempfile::tempdir().unwrap();
        let truncated = LlmResponse {
            content: vec![ContentBlock::text("partial output...")],
            stop_reason: StopReason::MaxTokens,
            usage: Usage::default(),
        };
        let final_text = LlmResponse {
            content: vec![ContentBlock::text("...and the rest")],
            stop_reason: StopReason::EndTurn,
            usage: Usage::default(),
        };
        let (mut loop_, llm) = harness(&tmp, vec![truncated, final_text]).await;

        let outcome = loop_.run_turn("go", CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, TurnOutcome::EndTurn { text: "...and the rest".to_string() });
        assert_eq!(llm.calls.load(Ordering::SeqCst), 2);
        // The truncated assistant turn was popped; only [user, user-continuation-as-buffer-folded, assistant] remain.
        let history = &loop_.session().history;
        assert_eq!(history.len(), 3);
        assert!(history[1].text_only().contains("partial output"));
        assert_eq!(history[2].role, Role::Assistant);
    }

    #[tokio::test]
    async fn cancelled_batch_marks_every_pending_tool_use_cancelled() {
        let tmp = tempfile::tempdir().unwrap();
        let notify = Arc::new(Notify::new());

        struct SlowPrompter {
            notify: Arc<Notify>,
        }
        #[async_trait]
        impl hdev_sandbox::PermissionPrompter for SlowPrompter {
            async fn render(&self, _action: &str, _resource: &str, _arguments: Option<&serde_json::Value>) {}
            async fn prompt(
                &self,
                _action: &str,
                _resource: &str,
                _mode: SandboxMode,
                _arguments: Option<&serde_json::Value>,
            ) -> Result<hdev_sandbox::PermissionAnswer, hdev_sandbox::SandboxError> {
                self.notify.notified().await;
                Ok(hdev_sandbox::PermissionAnswer::Allow)
            }
        }

        let sandbox = Arc::new(Sandbox::new(
            tmp.path(),
            SandboxMode::RequestEveryTime,
            Arc::new(SlowPrompter { notify: Arc::clone(&notify) }),
        ));
        let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(NullShellPrompter)));
        let tool_context = ToolContext::new(Arc::clone(&sandbox), shell);
        let memory: Arc<dyn MemoryBackend> =
            Arc::new(FilesystemMemoryBackend::new(tmp.path().join("memory")).await.unwrap());

        let tool_use = LlmResponse {
            content: vec![ContentBlock::ToolUse {
                id: "call-1".to_string(),
                name: "list_directory".to_string(),
                input: serde_json::json!({"path": "."}),
            }],
            stop_reason: StopReason::ToolUse,
            usage: Usage::default(),
        };
        let llm = Arc::new(ScriptedClient::new(vec![tool_use]));
        let deps = AgentLoopDeps {
            llm,
            tools: Arc::new(ToolRegistry::with_defaults()),
            sandbox,
            tool_context,
            memory,
            compacter: Compacter::default(),
            enable_caching: false,
            system_prompt_tree_tokens: 1_000,
            max_summary_tokens: 1_000,
        };
        let mut loop_ = AgentLoop::new(Session::new(model(), Utc::now()), deps, None);

        let cancel = CancellationToken::new();
        let cancel_clone = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_clone.cancel();
        });

        let outcome = loop_.run_turn("list the directory", cancel).await.unwrap();
        assert_eq!(outcome, TurnOutcome::Cancelled);
        let history = &loop_.session().history;
        let cancelled: Vec<&ContentBlock> =
            loop_.session().tool_result_buffer.iter().filter(|b| matches!(b, ContentBlock::ToolResult { content, .. } if content == "cancelled")).collect();
        assert_eq!(cancelled.len(), 1);
        assert_eq!(history.len(), 2);
    }
}
