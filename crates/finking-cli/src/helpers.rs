//! Shared CLI helpers — path expansion, session listing, banners.

use std::path::PathBuf;

use colored::Colorize;

use finking_core::types::{ChatSessionSummary, SessionId, UserMode};
use finking_core::utils::truncate_string;

use crate::page::Page;

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs_next::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs_next::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

/// Print the banner shown at REPL start.
pub fn print_banner(user: Option<&str>, mode: UserMode) {
    let version = env!("CARGO_PKG_VERSION");
    println!();
    println!("{}  v{}", "👑 FINANCIAL KING".cyan().bold(), version.dimmed());
    match user {
        Some(user) => println!("{} {}", "Signed in as".dimmed(), user.bold()),
        None => println!("{}", "Not signed in (/login <user>)".yellow()),
    }
    println!("{} {}", "Mode:".dimmed(), mode.label().bold());
    println!(
        "{}",
        "Type a message, /help for commands, or \"exit\" to quit.".dimmed()
    );
    println!();
}

/// Print the bot's reply in single-message mode.
pub fn print_response(response: &str) {
    println!();
    println!("{}", "👑 FinKing".cyan().bold());
    if response.is_empty() {
        println!("{}", "(no response)".dimmed());
    } else {
        println!("{response}");
    }
    println!();
}

/// One line per session, newest first, the active one marked.
pub fn format_session_list(
    sessions: &[ChatSessionSummary],
    active: Option<&SessionId>,
) -> Vec<String> {
    if sessions.is_empty() {
        return vec!["(no sessions yet, /new to start one)".to_string()];
    }
    sessions
        .iter()
        .enumerate()
        .map(|(i, s)| {
            let marker = if Some(&s.id) == active { "*" } else { " " };
            let title = if s.title.is_empty() {
                "(untitled)".to_string()
            } else {
                truncate_string(&s.title, 40)
            };
            format!(
                "{marker} {:>2}. {:<40} {:>3} msgs  {}",
                i + 1,
                title,
                s.message_count,
                s.created_at.format("%Y-%m-%d %H:%M")
            )
        })
        .collect()
}

/// What a non-chat page shows in the terminal.
pub fn print_page(page: Page, mode: UserMode) {
    println!();
    println!("{} {}", "▸".cyan(), page.title().bold());
    match page {
        Page::Chatbot => println!("{}", "Chat is live. Type a message.".dimmed()),
        Page::Home | Page::Uploads | Page::Services | Page::Profile => println!(
            "{}",
            format!(
                "Nothing to do here from the terminal ({} mode). /page chatbot to chat.",
                mode.label().to_lowercase()
            )
            .dimmed()
        ),
    }
    println!();
}

pub fn print_help() {
    let rows = [
        ("/new", "start a new chat session"),
        ("/list", "list your sessions"),
        ("/switch <n|id>", "switch to a session by number or id"),
        ("/page <name>", "go to home, chatbot, uploads, services or profile"),
        ("/mode", "toggle student/professional mode"),
        ("/login <user>", "sign in as another user"),
        ("/logout", "sign out"),
        ("/help", "show this help"),
        ("exit", "quit"),
    ];
    println!();
    for (cmd, what) in rows {
        println!("  {:<16} {}", cmd.bold(), what.dimmed());
    }
    println!();
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
