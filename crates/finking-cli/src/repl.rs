//! Interactive REPL — the terminal view over the chat core.
//!
//! Uses `rustyline` for readline-style editing with persistent history.
//! Core events are printed by a background task as they arrive.

use anyhow::Result;
use colored::Colorize;
use rustyline::config::Configurer;
use rustyline::history::DefaultHistory;
use rustyline::{DefaultEditor, Editor};
use tokio::task::JoinHandle;
use tracing::debug;

use finking_chat::{ChatError, ChatSyncCore};
use finking_core::types::{SessionId, UserId, UserMode};

use crate::helpers;
use crate::page::Page;
use crate::transcript::Transcript;

/// Exit commands (case-insensitive match).
const EXIT_COMMANDS: &[&str] = &["exit", "quit", "/exit", "/quit", ":q"];

// ─────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────

#[derive(Debug, PartialEq, Eq)]
enum Command {
    New,
    List,
    Switch(String),
    Page(Page),
    Mode,
    Login(String),
    Logout,
    Help,
}

/// Parse a slash command. `None` means the input is a chat message.
fn parse_command(input: &str) -> Option<Result<Command, String>> {
    let rest = input.strip_prefix('/')?;
    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };

    let needs_arg = |usage: &str| -> Result<String, String> {
        if arg.is_empty() {
            Err(format!("usage: {usage}"))
        } else {
            Ok(arg.to_string())
        }
    };

    let command = match name.to_lowercase().as_str() {
        "new" => Ok(Command::New),
        "list" => Ok(Command::List),
        "switch" => needs_arg("/switch <n|id>").map(Command::Switch),
        "page" => needs_arg("/page <name>")
            .and_then(|name| name.parse::<Page>().map_err(|e| e.to_string()))
            .map(Command::Page),
        "mode" => Ok(Command::Mode),
        "login" => needs_arg("/login <user>").map(Command::Login),
        "logout" => Ok(Command::Logout),
        "help" => Ok(Command::Help),
        other => Err(format!("unknown command '/{other}', try /help")),
    };
    Some(command)
}

// ─────────────────────────────────────────────
// REPL state
// ─────────────────────────────────────────────

struct View {
    core: ChatSyncCore,
    user: Option<UserId>,
    mode: UserMode,
    page: Page,
}

impl View {
    fn prompt(&self) -> String {
        format!("[{}] You: ", self.mode.label())
    }

    async fn enter_page(&mut self, page: Page) -> Result<(), ChatError> {
        if page == self.page {
            return Ok(());
        }
        let leaving_chat = self.page.hosts_chat() && !page.hosts_chat();
        let entering_chat = !self.page.hosts_chat() && page.hosts_chat();
        self.page = page;

        if leaving_chat {
            self.core.teardown();
        }
        if entering_chat {
            if let Some(user) = self.user.clone() {
                self.core.sign_in(user).await?;
            }
        }
        helpers::print_page(page, self.mode);
        Ok(())
    }

    /// Resolve `/switch` input: a 1-based list position or a session id.
    fn resolve_session(&self, target: &str) -> Option<SessionId> {
        let sessions = self.core.sessions();
        if let Ok(n) = target.parse::<usize>() {
            return n
                .checked_sub(1)
                .and_then(|i| sessions.get(i))
                .map(|s| s.id.clone());
        }
        sessions
            .into_iter()
            .find(|s| s.id.as_str() == target)
            .map(|s| s.id)
    }

    async fn run_command(&mut self, command: Command) -> Result<(), ChatError> {
        match command {
            Command::Help => helpers::print_help(),
            Command::Mode => {
                self.mode = self.mode.toggled();
                println!("{} {}", "Mode:".dimmed(), self.mode.label().bold());
            }
            Command::Page(page) => self.enter_page(page).await?,
            Command::Login(user) => {
                let user = UserId::new(user);
                if self.page.hosts_chat() {
                    self.core.sign_in(user.clone()).await?;
                }
                println!("{} {}", "Signed in as".dimmed(), user.as_str().bold());
                self.user = Some(user);
            }
            Command::Logout => {
                self.core.sign_out().await;
                self.user = None;
                println!("{}", "Signed out.".dimmed());
            }
            Command::New | Command::List | Command::Switch(_) if !self.page.hosts_chat() => {
                println!("{}", "Chat commands work on the chatbot page (/page chatbot).".yellow());
            }
            Command::New => {
                self.core.create_session().await?;
            }
            Command::List => {
                let active = self.core.active_session();
                for line in helpers::format_session_list(&self.core.sessions(), active.as_ref()) {
                    println!("{line}");
                }
            }
            Command::Switch(target) => match self.resolve_session(&target) {
                Some(id) => self.core.select_session(&id).await?,
                None => println!("{}", format!("No session '{target}'.").yellow()),
            },
        }
        Ok(())
    }

    async fn send(&self, text: &str) -> Result<(), ChatError> {
        if !self.page.hosts_chat() {
            println!("{}", "Open the chatbot page to chat (/page chatbot).".yellow());
            return Ok(());
        }
        if self.core.active_session().is_none() && self.user.is_some() {
            self.core.create_session().await?;
        }
        self.core.send_message(text).await
    }
}

/// Print core events until the bus closes or the task is aborted.
fn spawn_printer(core: &ChatSyncCore) -> JoinHandle<()> {
    let events = core.events();
    tokio::spawn(async move {
        let mut transcript = Transcript::new();
        while let Some(event) = events.consume().await {
            debug!(event = event.kind(), "rendering event");
            for line in transcript.render(&event) {
                println!("{line}");
            }
        }
    })
}

// ─────────────────────────────────────────────
// Loop
// ─────────────────────────────────────────────

/// Run the interactive REPL loop on the chatbot page.
pub async fn run(core: ChatSyncCore, user: Option<UserId>, mode: UserMode) -> Result<()> {
    helpers::print_banner(user.as_ref().map(UserId::as_str), mode);

    let printer = spawn_printer(&core);
    let mut view = View {
        core,
        user,
        mode,
        page: Page::Chatbot,
    };
    if let Some(user) = view.user.clone() {
        view.core.sign_in(user).await?;
    }

    let mut editor = create_editor()?;

    loop {
        let input = match editor.readline(&view.prompt()) {
            Ok(line) => line,
            Err(rustyline::error::ReadlineError::Interrupted) => break,
            Err(rustyline::error::ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Input error: {e}");
                break;
            }
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            continue;
        }

        if is_exit_command(trimmed) {
            println!("\nGoodbye! 👋");
            break;
        }

        let _ = editor.add_history_entry(&input);

        let result = match parse_command(trimmed) {
            Some(Ok(command)) => view.run_command(command).await,
            Some(Err(usage)) => {
                println!("{}", usage.yellow());
                Ok(())
            }
            None => match view.send(&input).await {
                // Failed store calls while sending arrive as SyncError events.
                Err(ChatError::StoreUnavailable(_)) => Ok(()),
                other => other,
            },
        };

        match result {
            Ok(()) | Err(ChatError::EmptyInput) => {}
            Err(e) => eprintln!("{} {e}", "❌".red()),
        }
    }

    view.core.teardown();
    printer.abort();
    save_history(&mut editor);

    Ok(())
}

/// Create a rustyline editor with history.
fn create_editor() -> Result<Editor<(), DefaultHistory>> {
    let mut editor = DefaultEditor::new()?;
    editor.set_max_history_size(1000)?;

    let history_path = history_path();
    if history_path.exists() {
        let _ = editor.load_history(&history_path);
        debug!("loaded REPL history from {}", history_path.display());
    }

    Ok(editor)
}

/// Save history to disk.
fn save_history(editor: &mut Editor<(), DefaultHistory>) {
    let path = history_path();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = editor.save_history(&path) {
        debug!("failed to save history: {e}");
    }
}

/// Path to the history file.
fn history_path() -> std::path::PathBuf {
    finking_core::utils::get_data_path()
        .join("history")
        .join("cli_history")
}

/// Check if input is an exit command.
fn is_exit_command(input: &str) -> bool {
    let lower = input.to_lowercase();
    EXIT_COMMANDS.contains(&lower.as_str())
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
