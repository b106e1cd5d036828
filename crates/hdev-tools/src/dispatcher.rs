//! Parallel batch tool invocation (spec §4.G "Dispatch").
//!
//! One assistant turn can carry several `tool_use` blocks. They run
//! concurrently, gated per-tool by the registry's semaphores, but the
//! returned `tool_result` blocks always come back in the same order the
//! `tool_use` blocks were declared — regardless of which one finishes
//! first (spec §4.G invariant, spec §4.I step "Dispatching").

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;
use crate::registry::ToolRegistry;
use tokio::sync::Semaphore;

/// One `tool_use` block, detached from the [`hdev_llm::ContentBlock`]
/// representation so this crate doesn't need to depend on turn history.
#[derive(Debug, Clone)]
pub struct ToolCallRequest {
    /// Matches the eventual `tool_result.tool_use_id`.
    pub id: String,
    /// Declared tool name.
    pub name: String,
    /// Arguments as sent by the LLM, before coercion.
    pub input: Value,
}

/// The dispatcher's per-call output, ready to become a `tool_result`
/// content block.
#[derive(Debug, Clone)]
pub struct ToolResultBlock {
    /// The `tool_use` id this result answers.
    pub tool_use_id: String,
    /// Rendered tool output, or `"cancelled"`.
    pub content: String,
    /// Whether the tool itself reported failure.
    pub is_error: bool,
}

/// A signal that must unwind the whole batch rather than becoming a
/// `tool_result` (spec §4.I: "do something else" and operator Ctrl+C both
/// discard the in-flight tool-result buffer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The operator chose "do something else" at a permission prompt,
    /// carrying their replacement instruction if one was collected.
    DoSomethingElse(Option<String>),
    /// The batch was cancelled (operator Ctrl+C) before every call finished.
    Cancelled,
}

enum Signal {
    DoSomethingElse(Option<String>),
    Cancelled,
}

/// Run every call in `calls` concurrently, respecting each tool's
/// `max_concurrency`, and return results in input order.
///
/// `cancel` lets the caller (the Agent Loop) abort an in-flight batch, e.g.
/// on a second Ctrl+C. Every call still in flight when `cancel` fires, or
/// when any call signals "do something else", resolves to a `"cancelled"`
/// result instead of running to completion.
///
/// # Errors
///
/// Returns [`DispatchError::DoSomethingElse`] if any tool handler raised
/// the distinguished signal, or [`DispatchError::Cancelled`] if `cancel`
/// fired before the batch finished naturally. In both cases the caller
/// should discard the partial results rather than send them to the LLM.
pub async fn invoke_agent_tools(
    registry: &ToolRegistry,
    ctx: &ToolContext,
    calls: Vec<ToolCallRequest>,
    cancel: CancellationToken,
) -> Result<Vec<ToolResultBlock>, DispatchError> {
    let mut handles = Vec::with_capacity(calls.len());
    for call in calls {
        let ctx = ctx.clone();
        let cancel = cancel.clone();
        let entry = registry.get(&call.name).map(|r| (Arc::clone(&r.decl), r.semaphore.clone()));
        handles.push(tokio::spawn(invoke_one(entry, ctx, call, cancel)));
    }

    let mut results = Vec::with_capacity(handles.len());
    let mut failure: Option<DispatchError> = None;
    for handle in handles {
        match handle.await {
            Ok(Ok(block)) => results.push(block),
            Ok(Err(Signal::DoSomethingElse(alternate))) => {
                failure.get_or_insert(DispatchError::DoSomethingElse(alternate));
                cancel.cancel();
            }
            Ok(Err(Signal::Cancelled)) => {
                failure.get_or_insert(DispatchError::Cancelled);
            }
            Err(join_err) => {
                tracing::warn!(%join_err, "tool invocation task did not finish cleanly");
                failure.get_or_insert(DispatchError::Cancelled);
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(results),
    }
}

async fn invoke_one(
    entry: Option<(Arc<dyn ToolDeclaration>, Option<Arc<Semaphore>>)>,
    ctx: ToolContext,
    call: ToolCallRequest,
    cancel: CancellationToken,
) -> Result<ToolResultBlock, Signal> {
    let Some((decl, semaphore)) = entry else {
        return Ok(ToolResultBlock {
            tool_use_id: call.id,
            content: format!("Unknown function: {}", call.name),
            is_error: true,
        });
    };

    let _permit = if let Some(sem) = &semaphore {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Signal::Cancelled),
            permit = sem.acquire() => Some(permit.expect("tool semaphore is never closed")),
        }
    } else {
        None
    };

    if cancel.is_cancelled() {
        return Err(Signal::Cancelled);
    }

    let coerced = match coerce_input(&decl.input_schema(), call.input) {
        Ok(value) => value,
        Err(message) => {
            return Ok(ToolResultBlock { tool_use_id: call.id, content: message, is_error: true });
        }
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(Signal::Cancelled),
        outcome = decl.execute(&ctx, coerced) => match outcome {
            Ok(content) => Ok(ToolResultBlock { tool_use_id: call.id, content, is_error: false }),
            Err(err) if err.is_do_something_else() => Err(Signal::DoSomethingElse(err.do_something_else_alternate())),
            Err(err) => {
                let content = err
                    .permission_message()
                    .unwrap_or_else(|| format!("Error invoking tool '{}': {err}", call.name));
                Ok(ToolResultBlock { tool_use_id: call.id, content, is_error: true })
            }
        },
    }
}

/// Coerce string-typed JSON values to the type their schema property
/// declares (spec §4.G step 3: "arguments are coerced to the types their
/// schema declares before the handler runs").
fn coerce_input(schema: &Value, input: Value) -> Result<Value, String> {
    let Value::Object(mut obj) = input else { return Ok(input) };
    let Some(props) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(Value::Object(obj));
    };

    for (name, prop_schema) in props {
        let Some(current) = obj.get(name) else { continue };
        let Value::String(raw) = current else { continue };
        let Some(ty) = prop_schema.get("type").and_then(Value::as_str) else { continue };

        let coerced = match ty {
            "integer" => raw
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("invalid arguments: '{name}' must be an integer")),
            "number" => raw
                .parse::<f64>()
                .map(Value::from)
                .map_err(|_| format!("invalid arguments: '{name}' must be a number")),
            "boolean" => raw
                .parse::<bool>()
                .map(Value::from)
                .map_err(|_| format!("invalid arguments: '{name}' must be a boolean")),
            _ => continue,
        }?;
        obj.insert(name.clone(), coerced);
    }

    Ok(Value::Object(obj))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdev_sandbox::{NullPrompter, Sandbox, SandboxMode};
    use hdev_shell::{NullShellPrompter, ShellRunner};
    use std::time::Duration;

    fn ctx_with_root(root: &std::path::Path) -> ToolContext {
        let sandbox = Arc::new(Sandbox::new(root, SandboxMode::AllowAll, Arc::new(NullPrompter)));
        let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(NullShellPrompter)));
        ToolContext::new(sandbox, shell)
    }

    #[tokio::test]
    async fn results_preserve_input_order_regardless_of_completion_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "A").unwrap();
        std::fs::write(dir.path().join("b.txt"), "B").unwrap();
        let ctx = ctx_with_root(dir.path());
        let registry = ToolRegistry::with_defaults();

        let calls = vec![
            ToolCallRequest { id: "1".into(), name: "bash".into(), input: serde_json::json!({"command": "sleep 0.2 && echo first"}) },
            ToolCallRequest { id: "2".into(), name: "read_file".into(), input: serde_json::json!({"path": "a.txt"}) },
        ];

        let results = invoke_agent_tools(&registry, &ctx, calls, CancellationToken::new()).await.unwrap();
        assert_eq!(results[0].tool_use_id, "1");
        assert_eq!(results[1].tool_use_id, "2");
        assert!(results[1].content.contains('A'));
    }

    #[tokio::test]
    async fn unknown_tool_name_is_an_error_result_not_a_panic() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let registry = ToolRegistry::with_defaults();

        let calls = vec![ToolCallRequest { id: "1".into(), name: "does_not_exist".into(), input: serde_json::json!({}) }];
        let results = invoke_agent_tools(&registry, &ctx, calls, CancellationToken::new()).await.unwrap();
        assert!(results[0].is_error);
        assert_eq!(results[0].content, "Unknown function: does_not_exist");
    }

    #[tokio::test]
    async fn permission_denial_is_the_spec_exact_string_not_the_generic_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let sandbox = Arc::new(Sandbox::new(dir.path(), SandboxMode::RequestEveryTime, Arc::new(NullPrompter)));
        let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(NullShellPrompter)));
        let ctx = ToolContext::new(sandbox, shell);
        let registry = ToolRegistry::with_defaults();

        let calls = vec![ToolCallRequest {
            id: "1".into(),
            name: "write_file".into(),
            input: serde_json::json!({"path": "new.txt", "content": "hi"}),
        }];
        let results = invoke_agent_tools(&registry, &ctx, calls, CancellationToken::new()).await.unwrap();
        assert!(results[0].is_error);
        assert_eq!(results[0].content, "Error: No write permission for new.txt");
    }

    #[tokio::test]
    async fn write_family_serializes_two_concurrent_writes() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let registry = ToolRegistry::with_defaults();

        let calls = vec![
            ToolCallRequest {
                id: "1".into(),
                name: "write_file".into(),
                input: serde_json::json!({"path": "one.txt", "content": "one"}),
            },
            ToolCallRequest {
                id: "2".into(),
                name: "write_file".into(),
                input: serde_json::json!({"path": "two.txt", "content": "two"}),
            },
        ];

        let start = std::time::Instant::now();
        let results = invoke_agent_tools(&registry, &ctx, calls, CancellationToken::new()).await.unwrap();
        assert!(!results[0].is_error);
        assert!(!results[1].is_error);
        // not a timing assertion on duration, just that both completed under the same semaphore
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn string_integer_argument_is_coerced_before_execute() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "depth": { "type": "integer" } }
        });
        let coerced = coerce_input(&schema, serde_json::json!({"depth": "3"})).unwrap();
        assert_eq!(coerced["depth"], serde_json::json!(3));
    }

    #[tokio::test]
    async fn unparseable_coercion_is_a_structured_error_not_a_panic() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "depth": { "type": "integer" } }
        });
        let err = coerce_input(&schema, serde_json::json!({"depth": "not-a-number"})).unwrap_err();
        assert!(err.contains("depth"));
    }
}
