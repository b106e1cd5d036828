//! Terminal-driven [`PermissionPrompter`] (spec §4.A), grounded in
//! `astrid-cli`'s use of `dialoguer`/`colored` for interactive prompts.

use async_trait::async_trait;
use colored::Colorize;
use dialoguer::Select;
use serde_json::Value;

use hdev_sandbox::{PermissionAnswer, PermissionPrompter, SandboxError, SandboxMode};

/// Prompts the operator on stdin/stdout. The "do something else" choice
/// collects a follow-up line of free text and carries it in
/// [`SandboxError::DoSomethingElse`].
#[derive(Debug, Default)]
pub struct TerminalPrompter;

#[async_trait]
impl PermissionPrompter for TerminalPrompter {
    async fn render(&self, action: &str, resource: &str, arguments: Option<&Value>) {
        println!("{}", format!("Permission requested: {action} on {resource}").yellow().bold());
        if let Some(arguments) = arguments {
            if let Ok(pretty) = serde_json::to_string_pretty(arguments) {
                println!("{}", pretty.dimmed());
            }
        }
    }

    async fn prompt(
        &self,
        action: &str,
        resource: &str,
        mode: SandboxMode,
        arguments: Option<&Value>,
    ) -> Result<PermissionAnswer, SandboxError> {
        let action = action.to_string();
        let resource = resource.to_string();
        let arguments = arguments.cloned();

        tokio::task::spawn_blocking(move || blocking_prompt(&action, &resource, mode, arguments.as_ref()))
            .await
            .unwrap_or(Ok(PermissionAnswer::Deny))
    }
}

fn blocking_prompt(
    action: &str,
    resource: &str,
    mode: SandboxMode,
    _arguments: Option<&Value>,
) -> Result<PermissionAnswer, SandboxError> {
    let cache_note = match mode {
        SandboxMode::RememberPerResource => " (remembered for this resource)",
        SandboxMode::RememberAll => " (remembered for this action)",
        SandboxMode::RequestEveryTime | SandboxMode::AllowAll => "",
    };
    let choices = ["Allow", "Deny", "Do something else"];
    let selection = Select::new()
        .with_prompt(format!("Allow {action} on {resource}?{cache_note}"))
        .items(&choices)
        .default(0)
        .interact()
        .map_err(io_err)?;

    match selection {
        0 => Ok(PermissionAnswer::Allow),
        1 => Ok(PermissionAnswer::Deny),
        _ => {
            let alternate: String = dialoguer::Input::new()
                .with_prompt("What would you like to do instead?")
                .allow_empty(true)
                .interact_text()
                .map_err(io_err)?;
            let alternate = if alternate.trim().is_empty() { None } else { Some(alternate) };
            Err(SandboxError::DoSomethingElse { alternate })
        }
    }
}

fn io_err(e: dialoguer::Error) -> SandboxError {
    SandboxError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
}
