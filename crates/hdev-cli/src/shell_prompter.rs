//! Terminal-driven [`ShellTimeoutPrompter`] (spec §4.F).

use std::time::Duration;

use async_trait::async_trait;
use colored::Colorize;
use dialoguer::Select;

use hdev_shell::{ShellTimeoutChoice, ShellTimeoutPrompter};

/// Prompts the operator with the three-choice Continue/Kill/Background menu
/// once a command outruns `initial_timeout`.
#[derive(Debug, Default)]
pub struct TerminalShellPrompter;

#[async_trait]
impl ShellTimeoutPrompter for TerminalShellPrompter {
    async fn render_status(&self, elapsed: Duration, stdout_tail: &str, stderr_tail: &str) {
        println!(
            "{}",
            format!("Command still running after {}s", elapsed.as_secs()).yellow().bold()
        );
        if !stdout_tail.is_empty() {
            println!("--- stdout (tail) ---\n{stdout_tail}");
        }
        if !stderr_tail.is_empty() {
            println!("--- stderr (tail) ---\n{stderr_tail}");
        }
    }

    async fn choose(&self) -> ShellTimeoutChoice {
        tokio::task::spawn_blocking(|| {
            let choices = ["Continue", "Kill", "Background"];
            let selection = Select::new()
                .with_prompt("What would you like to do?")
                .items(&choices)
                .default(0)
                .interact()
                .unwrap_or(1);
            match selection {
                0 => ShellTimeoutChoice::Continue,
                2 => ShellTimeoutChoice::Background,
                _ => ShellTimeoutChoice::Kill,
            }
        })
        .await
        .unwrap_or(ShellTimeoutChoice::Kill)
    }
}
