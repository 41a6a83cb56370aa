//! `finking status` — show configuration and store status.

use anyhow::Result;
use colored::Colorize;

use finking_core::config::{get_config_path, load_config};
use finking_store::MemoryStore;

use crate::helpers::expand_tilde;

/// Run the status command.
pub fn run() -> Result<()> {
    let config = load_config(None);
    let config_path = get_config_path();

    println!();
    println!("{}", "👑 Finking Status".cyan().bold());
    println!();

    // Config
    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        if config_path.exists() {
            "✓".green().to_string()
        } else {
            "(not found, using defaults)".red().to_string()
        }
    );
    println!("  {:<18} {}", "App id:".bold(), config.app_id);
    println!(
        "  {:<18} {} ({})",
        "Default user:".bold(),
        config.user.default_user_id,
        config.user.mode.label().to_lowercase()
    );

    // Store
    println!();
    let data_file = expand_tilde(&config.store.data_file);
    let store_status = if !config.store.persist {
        format!("{}", "· in memory only (persist = false)".dimmed())
    } else if !data_file.exists() {
        format!("{}", "· empty (file not created yet)".dimmed())
    } else {
        match MemoryStore::open(&data_file) {
            Ok(store) => format!("{} {} documents", "✓".green(), store.document_count()),
            Err(e) => format!("{} {e}", "✗".red()),
        }
    };
    println!("  {:<18} {}", "Store file:".bold(), data_file.display());
    println!("  {:<18} {}", "Store:".bold(), store_status);

    // Sync
    let retry = &config.sync.write_retry;
    println!(
        "  {:<18} {} | retries: {}",
        "Sync:".bold(),
        format!("event buffer {}", config.sync.event_buffer).dimmed(),
        format!(
            "{} attempts, {}–{} ms backoff",
            retry.attempts(),
            retry.initial_backoff_ms,
            retry.max_backoff_ms
        )
        .dimmed(),
    );

    println!();

    Ok(())
}
