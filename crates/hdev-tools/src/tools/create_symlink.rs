//! `create_symlink` — create a symlink whose target stays inside the sandbox.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::declaration::ToolDeclaration;
use crate::error::ToolError;

/// Creates a symlink, permission-gated, target validated to resolve inside
/// the sandbox.
pub struct CreateSymlinkTool;

#[async_trait]
impl ToolDeclaration for CreateSymlinkTool {
    fn name(&self) -> &'static str {
        "create_symlink"
    }

    fn description(&self) -> &'static str {
        "Creates a symlink inside the sandbox. Both the link and its target must resolve inside \
         the sandbox root."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "target": {
                    "type": "string",
                    "description": "Path the symlink should point at (absolute or relative to the link's directory)"
                },
                "link_path": {
                    "type": "string",
                    "description": "Sandbox-relative path where the symlink is created"
                }
            },
            "required": ["target", "link_path"]
        })
    }

    // Filesystem write family: spec §4.G serializes this tool against
    // itself across a batch.
    fn max_concurrency(&self) -> usize {
        1
    }

    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError> {
        let target = input
            .get("target")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("target is required".to_string()))?;
        let link_path = input
            .get("link_path")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidArguments("link_path is required".to_string()))?;

        ctx.sandbox.create_symlink(target, link_path).await?;
        Ok(format!("Created symlink {link_path} -> {target}"))
    }
}
