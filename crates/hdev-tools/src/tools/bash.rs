//! `bash` — run a shell command through the interactive shell runner.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;

/// Executes a shell command (spec §4.F), subject to the denylist and the
/// sandbox's own `shell` permission check.
pub struct BashTool;

#[async_trait]
impl ToolDeclaration for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Runs a shell command. Long-running commands prompt the operator to continue, kill, or \
         background the process if they exceed the initial timeout."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The command to run under bash -c"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let command = input
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("command is required".to_string()))?;
        Ok(ctx.shell.run(command).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hdev_sandbox::{NullPrompter, Sandbox, SandboxMode};
    use hdev_shell::{NullShellPrompter, ShellRunner};
    use std::sync::Arc;

    fn ctx_with_root(root: &std::path::Path) -> ToolContext {
        let sandbox = Arc::new(Sandbox::new(root, SandboxMode::AllowAll, Arc::new(NullPrompter)));
        let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(NullShellPrompter)));
        ToolContext::new(sandbox, shell)
    }

    #[tokio::test]
    async fn runs_command_and_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let result = BashTool.execute(&ctx, serde_json::json!({"command": "echo hi"})).await.unwrap();
        assert!(result.contains("hi"));
    }

    #[tokio::test]
    async fn denylisted_command_returns_as_result_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let result = BashTool.execute(&ctx, serde_json::json!({"command": "sudo ls"})).await.unwrap();
        assert!(result.contains("not allowed"));
    }
}
