//! `write_file` — create or overwrite a sandboxed file.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;

/// Writes a file's full contents, permission-gated (diff shown for edits).
pub struct WriteFileTool;

#[async_trait]
impl ToolDeclaration for WriteFileTool {
    fn name(&self) -> &'static str {
        "write_file"
    }

    fn description(&self) -> &'static str {
        "Writes content to a file in the sandbox, creating it (and parent directories) if needed."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Sandbox-relative path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Full contents to write"
                }
            },
            "required": ["path", "content"]
        })
    }

    // Filesystem write family: spec §4.G serializes this tool against
    // itself across a batch.
    fn max_concurrency(&self) -> usize {
        1
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".to_string()))?;
        let content = input
            .get("content")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("content is required".to_string()))?;

        ctx.sandbox.write_file(path, content).await?;
        Ok(format!("Wrote {path}"))
    }
}
