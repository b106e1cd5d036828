//! `read_file` — read a sandboxed file's contents.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;

/// Reads a file from the sandbox.
pub struct ReadFileTool;

#[async_trait]
impl ToolDeclaration for ReadFileTool {
    fn name(&self) -> &'static str {
        "read_file"
    }

    fn description(&self) -> &'static str {
        "Reads a file from the sandbox and returns its contents."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Sandbox-relative path of the file to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".to_string()))?;
        Ok(ctx.sandbox.read_file(path).await?)
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
    async fn reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello world").unwrap();
        let ctx = ctx_with_root(dir.path());

        let result =
            ReadFileTool.execute(&ctx, serde_json::json!({"path": "notes.txt"})).await.unwrap();
        assert_eq!(result, "hello world");
    }

    #[tokio::test]
    async fn missing_path_argument_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let result = ReadFileTool.execute(&ctx, serde_json::json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn missing_file_is_sandbox_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ctx_with_root(dir.path());
        let result = ReadFileTool.execute(&ctx, serde_json::json!({"path": "nope.txt"})).await;
        assert!(result.is_err());
    }
}
