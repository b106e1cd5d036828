//! Shared context available to every built-in tool handler.

use std::sync::Arc;

use hdev_sandbox::Sandbox;
use hdev_shell::ShellRunner;

/// Everything a [`crate::ToolDeclaration`] needs to execute (spec §4.G
/// step 4: "await the handler with `(context, **coerced_inputs)`").
///
/// Cheap to clone: both fields are `Arc`, so the dispatcher hands each
/// spawned tool invocation its own handle to the same sandbox and shell.
#[derive(Clone)]
pub struct ToolContext {
    /// Permission-gated filesystem access for this session.
    pub sandbox: Arc<Sandbox>,
    /// Shell subprocess runner, shared across every `bash` invocation in
    /// the session so its adaptive-timeout prompter stays consistent.
    pub shell: Arc<ShellRunner>,
}

impl ToolContext {
    /// Build a context from its two collaborators.
    #[must_use]
    pub fn new(sandbox: Arc<Sandbox>, shell: Arc<ShellRunner>) -> Self {
        Self { sandbox, shell }
    }
}
