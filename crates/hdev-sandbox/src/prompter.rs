//! Front-end bridge for permission prompts.
//!
//! Kept deliberately tiny per spec §9's "Source patterns to re-architect":
//! callbacks for permission prompts and UI rendering become a two-method
//! interface, not a pair of free-floating function pointers.

use async_trait::async_trait;
use serde_json::Value;

use crate::sandbox::{SandboxError, SandboxMode};

/// What the operator answered to a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionAnswer {
    /// Allow this one action.
    Allow,
    /// Deny this one action.
    Deny,
}

/// Implemented by whichever front end drives permission prompts (terminal,
/// HTTP approval endpoint, test double). Held by the [`crate::Sandbox`] and
/// invoked from `check_permissions`.
#[async_trait]
pub trait PermissionPrompter: Send + Sync {
    /// Render the pending permission request (no return value — this is a
    /// side-effecting display step, separate from collecting the answer).
    async fn render(&self, action: &str, resource: &str, arguments: Option<&Value>);

    /// Collect the operator's answer. Returning
    /// `Err(SandboxError::DoSomethingElse { alternate })` propagates the
    /// distinguished escape signal up through the tool and dispatcher to
    /// the Agent Loop, carrying whatever replacement instruction this
    /// prompter collected from the operator.
    async fn prompt(
        &self,
        action: &str,
        resource: &str,
        mode: SandboxMode,
        arguments: Option<&Value>,
    ) -> Result<PermissionAnswer, SandboxError>;
}

/// A prompter that denies everything without asking. Useful as a safe
/// default and in tests that don't exercise the prompt path (e.g. because
/// the mode under test is `AllowAll` or the cache is pre-seeded).
#[derive(Debug, Default)]
pub struct NullPrompter;

#[async_trait]
impl PermissionPrompter for NullPrompter {
    async fn render(&self, _action: &str, _resource: &str, _arguments: Option<&Value>) {}

    async fn prompt(
        &self,
        _action: &str,
        _resource: &str,
        _mode: SandboxMode,
        _arguments: Option<&Value>,
    ) -> Result<PermissionAnswer, SandboxError> {
        Ok(PermissionAnswer::Deny)
    }
}
