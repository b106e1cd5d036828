//! The runner itself: spawn, stream, adaptively prompt on timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hdev_sandbox::{Sandbox, SandboxError};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::buffer::StreamBuffer;
use crate::prompter::{ShellTimeoutChoice, ShellTimeoutPrompter};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const KILL_GRACE: Duration = Duration::from_secs(1);
const STATUS_PREVIEW_BYTES: usize = 500;
const DEFAULT_INITIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can escape [`ShellRunner::run`] itself (as opposed to being
/// folded into the returned result string, per spec §7's "structured error
/// result, not an exception" policy — denylist hits and plain permission
/// denials are `Ok(String)`; only the distinguished "do something else"
/// signal and genuine spawn failures are `Err`).
#[derive(Debug, Error)]
pub enum ShellError {
    /// The subprocess could not be spawned, or an I/O error occurred while
    /// streaming its output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The operator chose "do something else" at the permission prompt;
    /// propagates to the Agent Loop (spec §4.A, §4.I).
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}

/// Long-running subprocess execution with an adaptive interactive timeout
/// (spec §4.F).
pub struct ShellRunner {
    sandbox: Arc<Sandbox>,
    prompter: Arc<dyn ShellTimeoutPrompter>,
    denylist: Regex,
    initial_timeout: Duration,
}

impl ShellRunner {
    /// Construct with the default 30-second initial timeout.
    #[must_use]
    pub fn new(sandbox: Arc<Sandbox>, prompter: Arc<dyn ShellTimeoutPrompter>) -> Self {
        Self::with_initial_timeout(sandbox, prompter, DEFAULT_INITIAL_TIMEOUT)
    }

    /// Construct with an explicit initial timeout (tests use short ones).
    #[must_use]
    pub fn with_initial_timeout(
        sandbox: Arc<Sandbox>,
        prompter: Arc<dyn ShellTimeoutPrompter>,
        initial_timeout: Duration,
    ) -> Self {
        Self {
            sandbox,
            prompter,
            denylist: Regex::new(r"\bsudo\b").expect("static denylist pattern is valid"),
            initial_timeout,
        }
    }

    /// Run `command` under `bash -c`, gated by the denylist and sandbox
    /// permission check.
    ///
    /// # Errors
    ///
    /// Returns [`ShellError::Sandbox`] only for the "do something else"
    /// escape; plain denials are folded into the returned string.
    pub async fn run(&self, command: &str) -> Result<String, ShellError> {
        if self.denylist.is_match(command) {
            return Ok("Error: This command is not allowed for safety reasons.".to_string());
        }

        match self.sandbox.check_permissions("shell", command, None).await {
            Ok(true) => {}
            Ok(false) => return Ok("Error: Operator denied permission.".to_string()),
            Err(err @ SandboxError::DoSomethingElse { .. }) => return Err(err.into()),
            Err(err) => return Err(err.into()),
        }

        self.run_unchecked(command).await
    }

    async fn run_unchecked(&self, command: &str) -> Result<String, ShellError> {
        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false)
            .spawn()?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let out_buf = Arc::new(Mutex::new(StreamBuffer::default()));
        let err_buf = Arc::new(Mutex::new(StreamBuffer::default()));
        let out_task = spawn_reader(stdout, Arc::clone(&out_buf));
        let err_task = spawn_reader(stderr, Arc::clone(&err_buf));

        let start = Instant::now();
        let mut current_timeout = self.initial_timeout;

        loop {
            if let Some(status) = child.try_wait()? {
                let _ = out_task.await;
                let _ = err_task.await;
                let stdout_content = out_buf.lock().await.full_text();
                let stderr_content = err_buf.lock().await.full_text();
                return Ok(format_completed(status.code(), &stdout_content, &stderr_content));
            }

            if start.elapsed() >= current_timeout {
                let elapsed = start.elapsed();
                let (stdout_tail, stderr_tail) = {
                    let out = out_buf.lock().await;
                    let err = err_buf.lock().await;
                    (out.tail(STATUS_PREVIEW_BYTES), err.tail(STATUS_PREVIEW_BYTES))
                };
                self.prompter.render_status(elapsed, &stdout_tail, &stderr_tail).await;

                match self.prompter.choose().await {
                    ShellTimeoutChoice::Continue => {
                        current_timeout += self.initial_timeout;
                        tracing::info!(?current_timeout, "continuing to wait for shell command");
                    }
                    ShellTimeoutChoice::Kill => {
                        kill_process(&child, KILL_GRACE).await;
                        let _ = child.try_wait();
                        out_task.abort();
                        err_task.abort();
                        let stdout_content = out_buf.lock().await.full_text();
                        let stderr_content = err_buf.lock().await.full_text();
                        return Ok(format_killed(elapsed, &stdout_content, &stderr_content));
                    }
                    ShellTimeoutChoice::Background => {
                        let pid = child.id();
                        out_task.abort();
                        err_task.abort();
                        let stdout_content = out_buf.lock().await.full_text();
                        let stderr_content = err_buf.lock().await.full_text();
                        return Ok(format_backgrounded(elapsed, pid, &stdout_content, &stderr_content));
                    }
                }
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

fn spawn_reader<R>(reader: R, buf: Arc<Mutex<StreamBuffer>>) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            buf.lock().await.push_line(line);
        }
    })
}

async fn kill_process(child: &Child, grace: Duration) {
    let Some(pid) = child.id() else { return };
    let Ok(pid) = i32::try_from(pid) else { return };
    let pid = Pid::from_raw(pid);
    let _ = signal::kill(pid, Signal::SIGTERM);
    tokio::time::sleep(grace).await;
    if signal::kill(pid, None).is_ok() {
        let _ = signal::kill(pid, Signal::SIGKILL);
    }
}

fn format_completed(exit_code: Option<i32>, stdout: &str, stderr: &str) -> String {
    let mut out = match exit_code {
        Some(code) => format!("Exit code: {code}\n"),
        None => "Exit code: unknown (terminated by signal)\n".to_string(),
    };
    if !stdout.is_empty() {
        out.push_str(&format!("STDOUT:\n{stdout}\n"));
    }
    if !stderr.is_empty() {
        out.push_str(&format!("STDERR:\n{stderr}\n"));
    }
    out
}

fn format_killed(elapsed: Duration, stdout: &str, stderr: &str) -> String {
    let mut out =
        format!("Command was killed by user.\nExecution time: {:.1} seconds\n", elapsed.as_secs_f64());
    if !stdout.is_empty() {
        out.push_str(&format!("STDOUT (before kill):\n{stdout}\n"));
    }
    if !stderr.is_empty() {
        out.push_str(&format!("STDERR (before kill):\n{stderr}\n"));
    }
    out
}

fn format_backgrounded(elapsed: Duration, pid: Option<u32>, stdout: &str, stderr: &str) -> String {
    let pid_text = pid.map_or_else(|| "unknown".to_string(), |p| p.to_string());
    let mut out = format!(
        "Command backgrounded after {:.1} seconds (PID: {pid_text}).\nNote: Process continues running but output capture has stopped.\n",
        elapsed.as_secs_f64()
    );
    if !stdout.is_empty() {
        out.push_str(&format!("STDOUT (so far):\n{stdout}\n"));
    }
    if !stderr.is_empty() {
        out.push_str(&format!("STDERR (so far):\n{stderr}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hdev_sandbox::{NullPrompter, SandboxMode};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedPrompter {
        choices: Vec<ShellTimeoutChoice>,
        next: AtomicUsize,
    }

    #[async_trait]
    impl ShellTimeoutPrompter for ScriptedPrompter {
        async fn render_status(&self, _elapsed: Duration, _stdout_tail: &str, _stderr_tail: &str) {}

        async fn choose(&self) -> ShellTimeoutChoice {
            let idx = self.next.fetch_add(1, Ordering::SeqCst);
            self.choices.get(idx).copied().unwrap_or(ShellTimeoutChoice::Kill)
        }
    }

    fn allow_all_sandbox() -> Arc<Sandbox> {
        let tmp = tempfile::tempdir().unwrap();
        Arc::new(Sandbox::new(tmp.path(), SandboxMode::AllowAll, Arc::new(NullPrompter)))
    }

    #[tokio::test]
    async fn denylisted_command_is_rejected_without_spawning() {
        let runner = ShellRunner::new(allow_all_sandbox(), Arc::new(ScriptedPrompter { choices: vec![], next: AtomicUsize::new(0) }));
        let result = runner.run("sudo rm -rf /").await.unwrap();
        assert!(result.contains("not allowed"));
    }

    #[tokio::test]
    async fn echo_command_captures_stdout_and_exit_code() {
        let runner = ShellRunner::new(allow_all_sandbox(), Arc::new(ScriptedPrompter { choices: vec![], next: AtomicUsize::new(0) }));
        let result = runner.run("echo hello world").await.unwrap();
        assert!(result.contains("Exit code: 0"));
        assert!(result.contains("hello world"));
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported() {
        let runner = ShellRunner::new(allow_all_sandbox(), Arc::new(ScriptedPrompter { choices: vec![], next: AtomicUsize::new(0) }));
        let result = runner.run("exit 7").await.unwrap();
        assert!(result.contains("Exit code: 7"));
    }

    #[tokio::test]
    async fn timeout_then_kill_returns_promptly() {
        let prompter = Arc::new(ScriptedPrompter { choices: vec![ShellTimeoutChoice::Kill], next: AtomicUsize::new(0) });
        let runner =
            ShellRunner::with_initial_timeout(allow_all_sandbox(), prompter, Duration::from_millis(300));
        let start = Instant::now();
        let result = runner.run("sleep 10").await.unwrap();
        assert!(result.contains("Command was killed by user"));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn continue_then_kill_extends_timeout() {
        let prompter = Arc::new(ScriptedPrompter {
            choices: vec![ShellTimeoutChoice::Continue, ShellTimeoutChoice::Kill],
            next: AtomicUsize::new(0),
        });
        let runner =
            ShellRunner::with_initial_timeout(allow_all_sandbox(), prompter, Duration::from_millis(200));
        let result = runner.run("sleep 10").await.unwrap();
        assert!(result.contains("killed by user"));
    }

    #[tokio::test]
    async fn background_returns_with_pid_and_leaves_process_running() {
        let prompter =
            Arc::new(ScriptedPrompter { choices: vec![ShellTimeoutChoice::Background], next: AtomicUsize::new(0) });
        let runner =
            ShellRunner::with_initial_timeout(allow_all_sandbox(), prompter, Duration::from_millis(200));
        let result = runner.run("sleep 2").await.unwrap();
        assert!(result.contains("backgrounded"));
        assert!(result.contains("PID"));
    }
}
