//! `edit_file` — exact string replacement inside a sandboxed file.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;

/// Performs an exact string replacement, then routes the result through
/// `Sandbox::write_file` so the operator sees the usual diff prompt.
pub struct EditFileTool;

#[async_trait]
impl ToolDeclaration for EditFileTool {
    fn name(&self) -> &'static str {
        "edit_file"
    }

    fn description(&self) -> &'static str {
        "Replaces an exact substring in a sandboxed file. Fails if old_string is not found or \
         matches more than once, unless replace_all is set."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Sandbox-relative path of the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "The exact text to find and replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "The replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring uniqueness"
                }
            },
            "required": ["path", "old_string", "new_string"]
        })
    }

    fn max_concurrency(&self) -> usize {
        1
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let path = input
            .get("path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("path is required".to_string()))?;
        let old_string = input
            .get("old_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("old_string is required".to_string()))?;
        let new_string = input
            .get("new_string")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("new_string is required".to_string()))?;
        let replace_all = input.get("replace_all").and_then(Value::as_bool).unwrap_or(false);

        let content = ctx.sandbox.read_file(path).await?;
        let count = content.matches(old_string).count();

        if count == 0 {
            return Err(ToolError::ExecutionFailed(format!("old_string not found in {path}")));
        }
        if count > 1 && !replace_all {
            return Err(ToolError::ExecutionFailed(format!(
                "old_string found {count} times in {path} — use replace_all or provide more context to make it unique"
            )));
        }

        let new_content = if replace_all {
            content.replace(old_string, new_string)
        } else {
            content.replacen(old_string, new_string, 1)
        };

        ctx.sandbox.write_file(path, &new_content).await?;

        if replace_all && count > 1 {
            Ok(format!("Replaced {count} occurrences in {path}"))
        } else {
            Ok(format!("Edited {path}"))
        }
    }
}
