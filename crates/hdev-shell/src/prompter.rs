//! Front-end bridge for the shell runner's adaptive timeout prompt.

use std::time::Duration;

use async_trait::async_trait;

/// The operator's answer to "command is still running" (spec §4.F table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellTimeoutChoice {
    /// Extend the timeout by another `initial_timeout` seconds.
    Continue,
    /// SIGTERM (then SIGKILL after a 1s grace period).
    Kill,
    /// Return immediately; the child keeps running unattended.
    Background,
}

/// Implemented by whatever front end drives the timeout prompt.
#[async_trait]
pub trait ShellTimeoutPrompter: Send + Sync {
    /// Show the elapsed time and the most recent output from each stream.
    async fn render_status(&self, elapsed: Duration, stdout_tail: &str, stderr_tail: &str);

    /// Collect the operator's choice.
    async fn choose(&self) -> ShellTimeoutChoice;
}

/// A prompter that always kills on timeout, for tests and any front end that
/// can't yet drive a real prompt. Matches [`hdev_sandbox::NullPrompter`]'s
/// safe-default posture: an un-prompted timeout should not silently keep
/// waiting forever.
#[derive(Debug, Default)]
pub struct NullShellPrompter;

#[async_trait]
impl ShellTimeoutPrompter for NullShellPrompter {
    async fn render_status(&self, _elapsed: Duration, _stdout_tail: &str, _stderr_tail: &str) {}

    async fn choose(&self) -> ShellTimeoutChoice {
        ShellTimeoutChoice::Kill
    }
}
