//! `hdev` — thin CLI front end for the interactive coding-assistant runtime
//! (spec §6 "CLI surface"; explicitly outside the core per spec §1, kept
//! only as a runnable front end, grounded in `astrid-cli`'s subcommand
//! layout and `tracing-subscriber` initialization).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(unreachable_pub)]

mod commands;
mod config;
mod shell_prompter;
mod terminal_prompter;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// hdev — interactive coding-assistant runtime.
#[derive(Parser)]
#[command(name = "hdev")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start (or resume) an interactive chat session (default if no
    /// subcommand is given).
    Chat {
        /// Directory the Permission Sandbox is rooted at.
        #[arg(long, default_value = ".")]
        root: PathBuf,
        /// Resume a previously persisted session by id.
        #[arg(long)]
        session: Option<String>,
        /// Send this text as the first turn before entering the REPL.
        #[arg(long)]
        prompt: Option<String>,
        /// Run exactly one turn to `end_turn` then exit (spec §4.I
        /// "Single-response mode"). Requires `--prompt`.
        #[arg(long)]
        single_response: bool,
    },

    /// Launch the memory HTTP server backend (spec §4.C).
    MemoryServer {
        /// Root directory for the filesystem-backed entries this server
        /// exposes.
        #[arg(long, default_value = "./memory")]
        memory_root: PathBuf,
        /// Address to bind the HTTP listener to.
        #[arg(long, default_value = "127.0.0.1:8787")]
        bind: String,
        /// Require this bearer token on every route but `/api/health`.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// Copy every entry from one memory backend to another (spec §4.D).
    MigrateMemory {
        /// Source backend: a filesystem directory, or an `http(s)://` URL
        /// (optionally suffixed `#<bearer-token>`).
        #[arg(long)]
        source: String,
        /// Target backend, same syntax as `--source`.
        #[arg(long)]
        target: String,
        /// Overwrite entries already present in the target.
        #[arg(long)]
        overwrite: bool,
        /// Count what would be copied without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Google OAuth token management (out of scope; see `commands::gauth`).
    Gauth {
        /// `generate`, `export`, or `import`.
        action: String,
        /// `gmail` or `calendar`.
        service: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Some(Commands::Chat { root, session, prompt, single_response }) => {
            commands::chat::run(root, session, prompt, single_response).await.map(|()| 0)
        }
        Some(Commands::MemoryServer { memory_root, bind, api_key }) => {
            commands::memory_server::run(memory_root, bind, api_key).await.map(|()| 0)
        }
        Some(Commands::MigrateMemory { source, target, overwrite, dry_run }) => {
            commands::migrate_memory::run(source, target, overwrite, dry_run).await.map(|()| 0)
        }
        Some(Commands::Gauth { action, service }) => commands::gauth::run(&action, &service).map(|()| 0),
        None => commands::chat::run(PathBuf::from("."), None, None, false).await.map(|()| 0),
    };

    match exit_code {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("hdev: {err:#}");
            std::process::exit(1);
        }
    }
}
