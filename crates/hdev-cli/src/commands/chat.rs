//! `hdev chat` (spec §6 "CLI surface"): the interactive front end that
//! drives [`hdev_runtime::AgentLoop`], grounded in `astrid-cli`'s `repl`
//! module for the read-eval-print shape and double-Ctrl+C debounce.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use colored::Colorize;
use tokio_util::sync::CancellationToken;

use hdev_compact::Compacter;
use hdev_core::{HdevHome, SessionId};
use hdev_llm::AnthropicClient;
use hdev_memory::{FilesystemMemoryBackend, MemoryBackend};
use hdev_ratelimit::RateLimiter;
use hdev_runtime::{AgentLoop, AgentLoopDeps, Session, SessionStore, TurnOutcome};
use hdev_sandbox::Sandbox;
use hdev_shell::ShellRunner;
use hdev_tools::{ToolContext, ToolRegistry};

use crate::config::HdevConfig;
use crate::shell_prompter::TerminalShellPrompter;
use crate::terminal_prompter::TerminalPrompter;

const DOUBLE_CTRL_C_WINDOW: Duration = Duration::from_secs(1);

/// Run the interactive chat loop, or (with `single_response`/`prompt` set)
/// exactly one turn before exiting (spec §4.I "Single-response mode").
pub async fn run(
    sandbox_root: PathBuf,
    resume: Option<String>,
    prompt: Option<String>,
    single_response: bool,
) -> Result<()> {
    let home = HdevHome::resolve().context("resolving $HDEV_HOME")?;
    home.ensure().context("creating runtime state directories")?;
    let config = HdevConfig::load(&home).context("loading configuration")?;
    let api_key = config
        .api_key
        .clone()
        .context("no API key configured; set HDEV_API_KEY or model_api_name.api_key in config.yaml")?;

    let sandbox = Arc::new(Sandbox::new(&sandbox_root, config.sandbox_mode(), Arc::new(TerminalPrompter)));
    let shell = Arc::new(ShellRunner::new(Arc::clone(&sandbox), Arc::new(TerminalShellPrompter)));
    let tool_context = ToolContext::new(Arc::clone(&sandbox), shell);
    let tools = Arc::new(ToolRegistry::with_defaults());

    let memory: Arc<dyn MemoryBackend> = Arc::new(
        FilesystemMemoryBackend::new(home.memory_dir())
            .await
            .context("initializing the filesystem memory backend")?,
    );

    let rate_limiter = Arc::new(RateLimiter::new());
    let llm = Arc::new(AnthropicClient::new(config.base_url.clone(), api_key, rate_limiter));

    let store = SessionStore::new(home).context("opening session store")?;

    let session = match resume {
        Some(id_text) => {
            let id: SessionId = id_text.parse().context("invalid --session id")?;
            match store.load(id).await? {
                Some(persisted) => {
                    let mut session = Session::new(config.model_spec(), persisted.created_at);
                    session.id = persisted.session_id;
                    session.parent_session_id = persisted.parent_session_id;
                    session.history = persisted.chat_history;
                    session.tool_result_buffer = persisted.tool_result_buffer;
                    session
                }
                None => {
                    println!("{}", format!("No session found for {id}; starting a new one.").yellow());
                    Session::new(config.model_spec(), chrono::Utc::now())
                }
            }
        }
        None => Session::new(config.model_spec(), chrono::Utc::now()),
    };

    println!("{}", format!("Session {}", session.id).cyan());

    let deps = AgentLoopDeps {
        llm,
        tools,
        sandbox,
        tool_context,
        memory,
        compacter: Compacter::default(),
        enable_caching: config.enable_caching,
        system_prompt_tree_tokens: config.system_prompt_tree_tokens,
        max_summary_tokens: config.max_summary_tokens,
    };

    let mut agent_loop = AgentLoop::new(session, deps, Some(store));

    if let Some(prompt) = prompt {
        run_one_turn(&mut agent_loop, &prompt).await?;
        if single_response {
            return Ok(());
        }
    }

    repl(&mut agent_loop).await
}

async fn repl(agent_loop: &mut AgentLoop) -> Result<()> {
    let last_prompt_ctrl_c: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));

    loop {
        let line = match read_line("> ") {
            Some(line) => line,
            None => break, // EOF (Ctrl+D)
        };
        let line = line.trim();

        if line.is_empty() {
            continue;
        }
        match line {
            "/quit" => break,
            "/restart" => {
                println!("{}", "Restarting session history.".dimmed());
                continue;
            }
            _ => {}
        }

        let dispatching = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let watcher = spawn_ctrl_c_watcher(Arc::clone(&dispatching), cancel.clone(), Arc::clone(&last_prompt_ctrl_c));

        let outcome = agent_loop.run_turn(line, cancel).await;
        watcher.abort();

        match outcome {
            Ok(TurnOutcome::EndTurn { text }) => println!("{text}"),
            Ok(TurnOutcome::Cancelled) => println!("{}", "Cancelled pending tool calls.".yellow()),
            Err(err) => println!("{}", format!("Error: {err}").red()),
        }
    }
    Ok(())
}

async fn run_one_turn(agent_loop: &mut AgentLoop, prompt: &str) -> Result<()> {
    let outcome = agent_loop.run_turn(prompt, CancellationToken::new()).await?;
    if let TurnOutcome::EndTurn { text } = outcome {
        println!("{text}");
    }
    Ok(())
}

/// Spawn a task that cancels in-flight tool dispatch on Ctrl+C, and exits
/// the process if a second Ctrl+C arrives within one second while the loop
/// is idle at the prompt (spec §4.I "Interrupt semantics").
fn spawn_ctrl_c_watcher(
    dispatching: Arc<AtomicBool>,
    cancel: CancellationToken,
    last_prompt_ctrl_c: Arc<Mutex<Option<Instant>>>,
) -> tokio::task::JoinHandle<()> {
    dispatching.store(true, Ordering::SeqCst);
    tokio::spawn(async move {
        loop {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            if dispatching.load(Ordering::SeqCst) {
                cancel.cancel();
                continue;
            }
            let now = Instant::now();
            let mut last = last_prompt_ctrl_c.lock().unwrap();
            if last.is_some_and(|prev| now.duration_since(prev) < DOUBLE_CTRL_C_WINDOW) {
                std::process::exit(2);
            }
            *last = Some(now);
        }
    })
}

fn read_line(prompt: &str) -> Option<String> {
    use std::io::Write;
    print!("{prompt}");
    std::io::stdout().flush().ok();
    let mut buf = String::new();
    match std::io::stdin().read_line(&mut buf) {
        Ok(0) => None,
        Ok(_) => Some(buf),
        Err(_) => None,
    }
}
