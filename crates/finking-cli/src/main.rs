//! Finking CLI — entry point.
//!
//! # Commands
//!
//! - `finking chat [-m MESSAGE] [-u USER]` — chat (single-shot or REPL)
//! - `finking init` — write a default config file
//! - `finking status` — show configuration and store status

mod helpers;
mod page;
mod repl;
mod status;
mod transcript;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use finking_chat::{ChatSyncCore, LogPhase, SimulatedReply};
use finking_core::auth;
use finking_core::bus::{ChatEvent, EventBus};
use finking_core::config::{get_config_path, load_config, save_config, Config};
use finking_core::types::{Sender, UserId};
use finking_store::MemoryStore;

/// How long single-shot mode waits for the session list.
const READY_TIMEOUT: Duration = Duration::from_secs(5);

// ─────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────

/// 👑 Finking — FINANCIAL KING chat client
#[derive(Parser)]
#[command(name = "finking", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chat with the assistant (single-shot or interactive REPL)
    Chat {
        /// Single message (non-interactive). Omit for REPL mode.
        #[arg(short, long)]
        message: Option<String>,

        /// Sign in as this user (defaults to config user.defaultUserId)
        #[arg(short, long)]
        user: Option<String>,

        /// Store file (defaults to config store.dataFile)
        #[arg(long)]
        store: Option<PathBuf>,

        /// Keep everything in memory; nothing is written to disk
        #[arg(long, default_value_t = false)]
        memory: bool,

        /// Enable debug logging
        #[arg(long, default_value_t = false)]
        logs: bool,
    },

    /// Write a default config file (keeps an existing one)
    Init,

    /// Show configuration and store status
    Status,
}

// ─────────────────────────────────────────────
// Entrypoint
// ─────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Chat {
            message,
            user,
            store,
            memory,
            logs,
        } => {
            init_logging(logs);
            run_chat(message, user, store, memory).await
        }
        Commands::Init => init(),
        Commands::Status => status::run(),
    }
}

// ─────────────────────────────────────────────
// Init command
// ─────────────────────────────────────────────

fn init() -> Result<()> {
    let path = get_config_path();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    save_config(&Config::default(), Some(&path))
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("✓ Created config at {}", path.display());
    Ok(())
}

// ─────────────────────────────────────────────
// Chat command
// ─────────────────────────────────────────────

async fn run_chat(
    message: Option<String>,
    user: Option<String>,
    store_path: Option<PathBuf>,
    in_memory: bool,
) -> Result<()> {
    let config = load_config(None);
    let store = open_store(&config, store_path, in_memory)?;

    // The identity provider here is the command line: report once, wait once.
    let (resolver, ready) = auth::handshake();
    let user = user.unwrap_or_else(|| config.user.default_user_id.clone());
    resolver.resolve(Some(UserId::new(user)));
    let user = ready.wait().await.context("identity provider went away")?;

    let core = ChatSyncCore::new(Arc::new(store), Arc::new(SimulatedReply), &config);

    match message {
        Some(msg) => {
            let user = user.context("not signed in")?;
            info!(user = %user, "sending single message");
            let reply = send_once(&core, user, &msg).await?;
            helpers::print_response(&reply);
        }
        None => {
            repl::run(core, user, config.user.mode).await?;
        }
    }

    Ok(())
}

/// Build the document store from config and flags.
fn open_store(config: &Config, path: Option<PathBuf>, in_memory: bool) -> Result<MemoryStore> {
    if in_memory || (path.is_none() && !config.store.persist) {
        return Ok(MemoryStore::new());
    }
    let path = path.unwrap_or_else(|| helpers::expand_tilde(&config.store.data_file));
    MemoryStore::open(&path).with_context(|| format!("failed to open store {}", path.display()))
}

/// Sign in, make sure a session is open, send `text`, return the bot reply.
async fn send_once(core: &ChatSyncCore, user: UserId, text: &str) -> Result<String> {
    let events = core.events();
    core.sign_in(user).await?;
    tokio::time::timeout(READY_TIMEOUT, wait_for_session(core, &events))
        .await
        .context("timed out waiting for chat sessions")??;

    core.send_message(text).await?;
    let reply = core
        .messages()
        .into_iter()
        .rev()
        .find(|m| m.sender == Sender::Bot)
        .map(|m| m.text)
        .unwrap_or_default();
    Ok(reply)
}

/// Wait until the active session's log is synced, creating a session if the
/// user has none. Sending before the first snapshot would overwrite the
/// stored log with a partial one.
async fn wait_for_session(core: &ChatSyncCore, events: &EventBus) -> Result<()> {
    loop {
        if core.active_session().is_some() && core.log_phase() == LogPhase::Synced {
            return Ok(());
        }
        match events.consume().await {
            Some(ChatEvent::SessionsChanged { sessions })
                if sessions.is_empty() && core.active_session().is_none() =>
            {
                core.create_session().await?;
            }
            Some(_) => {}
            None => bail!("event bus closed"),
        }
    }
}

/// Initialize tracing/logging.
fn init_logging(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("finking=debug,info")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
