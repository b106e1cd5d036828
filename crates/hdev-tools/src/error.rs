//! Errors produced while invoking a declared tool.

use hdev_sandbox::SandboxError;
use hdev_shell::ShellError;
use thiserror::Error;

/// A handler-level failure (spec §4.G step 5: "Handler exceptions except
/// the distinguished `DoSomethingElse` are caught and returned as an error
/// result"). [`ToolError::DoSomethingElse`] is the one variant the
/// dispatcher re-raises instead of folding into a result string.
#[derive(Debug, Error)]
pub enum ToolError {
    /// A required argument was missing or had the wrong JSON type.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The underlying sandbox operation failed (permission denied, path
    /// outside the sandbox, not found, I/O).
    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    /// The shell runner failed to spawn or stream the subprocess.
    #[error(transparent)]
    Shell(#[from] ShellError),

    /// Operation-specific failure that isn't a sandbox or shell error.
    #[error("{0}")]
    ExecutionFailed(String),

    /// The operator chose "do something else" at a permission prompt;
    /// propagates to the Agent Loop rather than becoming a result string.
    #[error("operator requested a different action")]
    DoSomethingElse {
        /// The operator's replacement instruction, if collected.
        alternate: Option<String>,
    },
}

impl ToolError {
    /// Whether this error is the distinguished signal that must unwind
    /// through the dispatcher instead of becoming a `tool_result`.
    #[must_use]
    pub fn is_do_something_else(&self) -> bool {
        matches!(
            self,
            ToolError::DoSomethingElse { .. }
                | ToolError::Sandbox(SandboxError::DoSomethingElse { .. })
                | ToolError::Shell(ShellError::Sandbox(SandboxError::DoSomethingElse { .. }))
        )
    }

    /// The operator's replacement instruction, if this is a
    /// `DoSomethingElse` signal that carried one.
    #[must_use]
    pub fn do_something_else_alternate(&self) -> Option<String> {
        match self {
            ToolError::DoSomethingElse { alternate }
            | ToolError::Sandbox(SandboxError::DoSomethingElse { alternate })
            | ToolError::Shell(ShellError::Sandbox(SandboxError::DoSomethingElse { alternate })) => alternate.clone(),
            _ => None,
        }
    }

    /// The spec's fixed operator-facing denial text (spec §7, §8 S2), for
    /// permission-denied failures only. The dispatcher uses this in place
    /// of the generic `"Error invoking tool '<name>': <message>"` wrapper
    /// so the exact string survives the `Sandbox`/`Shell(Sandbox(..))`
    /// nesting instead of being swallowed by `#[error(transparent)]`.
    #[must_use]
    pub fn permission_message(&self) -> Option<String> {
        match self {
            ToolError::Sandbox(err) | ToolError::Shell(ShellError::Sandbox(err)) => err.permission_message(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn do_something_else_is_detected_through_the_shell_variant() {
        let err = ToolError::Shell(ShellError::Sandbox(SandboxError::DoSomethingElse {
            alternate: Some("just list it".to_string()),
        }));
        assert!(err.is_do_something_else());
        assert_eq!(err.do_something_else_alternate(), Some("just list it".to_string()));
    }

    #[test]
    fn plain_sandbox_errors_are_not_do_something_else() {
        let err = ToolError::Sandbox(SandboxError::NotFound("a.txt".to_string()));
        assert!(!err.is_do_something_else());
        assert_eq!(err.do_something_else_alternate(), None);
    }
}
