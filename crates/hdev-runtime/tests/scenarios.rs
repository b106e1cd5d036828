//! End-to-end scenarios from spec §8, driven through the real
//! [`AgentLoop`] rather than its unit-level collaborators, grounded in the
//! same scripted-transport harness `hdev_runtime::agent_loop`'s inline
//! tests use.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream;
use tokio_util::sync::CancellationToken;

use hdev_compact::Compacter;
use hdev_llm::{
    ChatRequest, ContentBlock, EventStream, LlmClient, LlmError, LlmResponse, ModelSpec, Role, StopReason,
    StreamEvent, Usage,
};
use hdev_memory::{FilesystemMemoryBackend, MemoryBackend};
use hdev_runtime::{AgentLoop, AgentLoopDeps, Session, TurnOutcome};
use hdev_sandbox::{NullPrompter, PermissionAnswer, PermissionPrompter, Sandbox, SandboxError, SandboxMode};
use hdev_shell::{NullShellPrompter, ShellRunner};
use hdev_tools::{ToolContext, ToolRegistry};

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

struct ScriptedClient {
    responses: Mutex<Vec<LlmResponse>>,
    token_count: u64,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(responses: Vec<LlmResponse>, token_count: u64) -> Self {
        Self { responses: Mutex::new(responses), token_count, calls: AtomicUsize::new(0) }
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
        Ok(self.token_count)
    }
}

async fn deps(tmp: &tempfile::TempDir, sandbox: Arc<Sandbox>, llm: Arc<ScriptedClient>, threshold_ratio: f64) -> AgentLoopDeps {
    let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(NullShellPrompter)));
    let tool_context = ToolContext::new(Arc::clone(&sandbox), shell);
    let memory: Arc<dyn MemoryBackend> =
        Arc::new(FilesystemMemoryBackend::new(tmp.path().join("memory")).await.unwrap());

    AgentLoopDeps {
        llm,
        tools: Arc::new(ToolRegistry::with_defaults()),
        sandbox,
        tool_context,
        memory,
        compacter: Compacter::with_threshold_ratio(threshold_ratio),
        enable_caching: false,
        system_prompt_tree_tokens: 1_000,
        max_summary_tokens: 1_000,
    }
}

/// S1. Read-and-echo: a `read_file` tool_use followed by an `end_turn` that
/// quotes the file's contents back, driven through the real sandbox and
/// dispatcher (spec §8 "S1").
#[tokio::test]
async fn s1_read_and_echo() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "hello world").unwrap();

    let sandbox = Arc::new(Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter)));
    let tool_use = LlmResponse {
        content: vec![ContentBlock::ToolUse {
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            input: serde_json::json!({"path": "notes.txt"}),
        }],
        stop_reason: StopReason::ToolUse,
        usage: Usage::default(),
    };
    let final_answer = LlmResponse {
        content: vec![ContentBlock::text("The file contains: hello world")],
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    };
    let llm = Arc::new(ScriptedClient::new(vec![tool_use, final_answer], 10));
    let deps = deps(&tmp, sandbox, Arc::clone(&llm), 0.85).await;
    let mut agent_loop = AgentLoop::new(Session::new(model(), Utc::now()), deps, None);

    let outcome = agent_loop.run_turn("print the contents of notes.txt", CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, TurnOutcome::EndTurn { text: "The file contains: hello world".to_string() });

    let history = &agent_loop.session().history;
    // user, assistant(tool_use), user(tool_result), assistant(end_turn)
    assert_eq!(history.len(), 4);
    assert_eq!(history[2].role, Role::User);
    let ContentBlock::ToolResult { content, .. } = &history[2].content[0] else {
        panic!("expected a tool_result block");
    };
    assert_eq!(content, "hello world");
    assert_eq!(agent_loop.session().turn_count, 1);
    assert_eq!(agent_loop.session().tool_call_count, 1);
}

/// S2. Permission denial: `RequestEveryTime` mode with a prompter that
/// always denies yields the spec's exact error text as the tool result,
/// and the file is never read (spec §8 "S2").
#[tokio::test]
async fn s2_permission_denial() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("notes.txt"), "hello world").unwrap();

    // NullPrompter always answers Deny (its documented safe default).
    let sandbox = Arc::new(Sandbox::new(tmp.path(), SandboxMode::RequestEveryTime, Arc::new(NullPrompter)));
    let tool_use = LlmResponse {
        content: vec![ContentBlock::ToolUse {
            id: "call-1".to_string(),
            name: "read_file".to_string(),
            input: serde_json::json!({"path": "notes.txt"}),
        }],
        stop_reason: StopReason::ToolUse,
        usage: Usage::default(),
    };
    let llm = Arc::new(ScriptedClient::new(vec![tool_use], 10));
    let deps = deps(&tmp, sandbox, Arc::clone(&llm), 0.85).await;
    let mut agent_loop = AgentLoop::new(Session::new(model(), Utc::now()), deps, None);

    let outcome = agent_loop.run_turn("print the contents of notes.txt", CancellationToken::new()).await.unwrap();
    // The scripted client has no further queued response, so the loop sees
    // an immediate (empty) end_turn after the denied tool result is folded in.
    assert_eq!(outcome, TurnOutcome::EndTurn { text: String::new() });

    let history = &agent_loop.session().history;
    let ContentBlock::ToolResult { content, is_error, .. } = &history[2].content[0] else {
        panic!("expected a tool_result block");
    };
    assert!(*is_error);
    assert_eq!(content, "Error: No read permission for notes.txt");
}

/// S3. Do-something-else: the operator declines a shell permission prompt
/// in favor of an alternate instruction; the assistant's `tool_use` turn is
/// popped and the alternate instruction is appended to the preceding user
/// turn instead of a `tool_result` (spec §8 "S3").
#[tokio::test]
async fn s3_do_something_else_rewrites_the_user_turn() {
    struct AlternatePrompter;

    #[async_trait]
    impl PermissionPrompter for AlternatePrompter {
        async fn render(&self, _action: &str, _resource: &str, _arguments: Option<&serde_json::Value>) {}

        async fn prompt(
            &self,
            _action: &str,
            _resource: &str,
            _mode: SandboxMode,
            _arguments: Option<&serde_json::Value>,
        ) -> Result<PermissionAnswer, SandboxError> {
            Err(SandboxError::DoSomethingElse { alternate: Some("just list it".to_string()) })
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    std::fs::create_dir(tmp.path().join("build")).unwrap();
    let sandbox = Arc::new(Sandbox::new(tmp.path(), SandboxMode::RequestEveryTime, Arc::new(AlternatePrompter)));

    let tool_use = LlmResponse {
        content: vec![ContentBlock::ToolUse {
            id: "call-1".to_string(),
            name: "bash".to_string(),
            input: serde_json::json!({"command": "rm -rf build"}),
        }],
        stop_reason: StopReason::ToolUse,
        usage: Usage::default(),
    };
    let after_rewrite = LlmResponse {
        content: vec![ContentBlock::text("Here's the listing instead.")],
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    };
    let llm = Arc::new(ScriptedClient::new(vec![tool_use, after_rewrite], 10));
    let deps = deps(&tmp, sandbox, Arc::clone(&llm), 0.85).await;
    let mut agent_loop = AgentLoop::new(Session::new(model(), Utc::now()), deps, None);

    let outcome = agent_loop.run_turn("Delete build/", CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, TurnOutcome::EndTurn { text: "Here's the listing instead.".to_string() });

    let history = &agent_loop.session().history;
    // The tool_use assistant turn was popped: [user(rewritten), assistant(end_turn)].
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text_only(), "Delete build/\n\nAlternate request: just list it");
}

/// S6. Compaction: a session whose counted full-context tokens exceed the
/// (near-zero) threshold forks into a new session before the main call,
/// with `parent_session_id` set to the original (spec §8 "S6").
#[tokio::test]
async fn s6_compaction_forks_session() {
    let tmp = tempfile::tempdir().unwrap();
    let sandbox = Arc::new(Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter)));

    let summary_response = LlmResponse {
        content: vec![ContentBlock::text("Summary of the conversation so far.")],
        stop_reason: StopReason::EndTurn,
        usage: Usage { output_tokens: 42, ..Usage::default() },
    };
    let final_answer = LlmResponse {
        content: vec![ContentBlock::text("continuing")],
        stop_reason: StopReason::EndTurn,
        usage: Usage::default(),
    };
    // threshold_ratio = 0 makes should_compact true for any positive token count.
    let llm = Arc::new(ScriptedClient::new(vec![summary_response, final_answer], 1));
    let deps = deps(&tmp, sandbox, Arc::clone(&llm), 0.0).await;

    let original = Session::new(model(), Utc::now());
    let original_id = original.id;
    let mut agent_loop = AgentLoop::new(original, deps, None);

    let outcome = agent_loop.run_turn("hello", CancellationToken::new()).await.unwrap();
    assert_eq!(outcome, TurnOutcome::EndTurn { text: "continuing".to_string() });

    let transition = agent_loop.last_compaction().expect("a compaction transition should have been recorded");
    assert_eq!(transition.original_session_id, original_id);
    assert_ne!(transition.new_session_id, original_id);
    assert_eq!(agent_loop.session().id, transition.new_session_id);
    assert_eq!(agent_loop.session().parent_session_id, Some(original_id));
}
