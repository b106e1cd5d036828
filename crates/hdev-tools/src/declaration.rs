//! The `ToolDeclaration` trait: one implementation per built-in tool.

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;
use crate::error::ToolError;

/// One declared tool (spec §4.G "Schema generation" / "Invocation").
#[async_trait]
pub trait ToolDeclaration: Send + Sync {
    /// Tool name, matched against `tool_use.name`.
    fn name(&self) -> &'static str;

    /// First paragraph of the handler's documentation, sent to the LLM.
    fn description(&self) -> &'static str;

    /// JSON Schema object: `{ type: "object", properties, required }`. Each
    /// property's `"type"` drives the dispatcher's input coercion.
    fn input_schema(&self) -> Value;

    /// Maximum number of concurrent in-flight calls to this tool across one
    /// batch. `1` for the filesystem write family (spec §4.G table);
    /// `usize::MAX` (unbounded) for everything else.
    fn max_concurrency(&self) -> usize {
        usize::MAX
    }

    /// Run the tool with already-coerced `input`.
    async fn execute(&self, ctx: &ToolContext, input: Value) -> Result<String, ToolError>;
}
