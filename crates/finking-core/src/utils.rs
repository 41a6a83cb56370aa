//! Utility helpers — data directory, chat titles, string truncation.

use std::path::PathBuf;

use chrono::{Datelike, NaiveDate};

/// Get the Finking data directory (e.g. `~/.finking/`).
pub fn get_data_path() -> PathBuf {
    let home = dirs_next::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".finking")
}

/// Title for a freshly created chat, e.g. `"New Chat - 7/1/2024"`.
pub fn new_chat_title(date: NaiveDate) -> String {
    format!("New Chat - {}", short_date(date))
}

/// Today's title, using the local calendar date.
pub fn new_chat_title_today() -> String {
    new_chat_title(chrono::Local::now().date_naive())
}

/// Month/day/year without zero padding (`7/1/2024`).
pub fn short_date(date: NaiveDate) -> String {
    format!("{}/{}/{}", date.month(), date.day(), date.year())
}

/// Truncate a string to `max_len` characters, adding "..." if truncated.
/// Unicode-safe.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", truncated)
    }
}
