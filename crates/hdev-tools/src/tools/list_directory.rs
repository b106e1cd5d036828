//! `list_directory` — flat, ignore-filtered listing of a sandboxed directory.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;

const DEFAULT_LIMIT: usize = 1000;

/// Lists files and directories under a sandboxed path.
pub struct ListDirectoryTool;

#[async_trait]
impl ToolDeclaration for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "list_directory"
    }

    fn description(&self) -> &'static str {
        "Lists files and directories under a sandboxed path, honoring .gitignore. \
         Returns an empty list if the listing would exceed the entry limit."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Sandbox-relative directory to list (defaults to the sandbox root)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Recurse into subdirectories"
                }
            },
            "required": []
        })
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let path = input.get("path").and_then(Value::as_str).unwrap_or(".");
        let recursive = input.get("recursive").and_then(Value::as_bool).unwrap_or(false);

        let entries = ctx.sandbox.directory_listing(path, recursive, DEFAULT_LIMIT)?;
        if entries.is_empty() {
            return Ok(format!("(no entries under {path}, or the listing exceeded {DEFAULT_LIMIT} entries)"));
        }
        Ok(entries.join("\n"))
    }
}
