//! Config loader — reads `~/.finking/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.finking/config.json`
//! 3. Environment variables `FINKING_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;
use crate::types::UserMode;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the default path + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Moves a top-level `appID` → `appId`.
fn migrate_config(raw: &mut serde_json::Value) {
    if let Some(obj) = raw.as_object_mut() {
        if !obj.contains_key("appId") {
            if let Some(val) = obj.remove("appID") {
                obj.insert("appId".to_string(), val);
                debug!("Migrated appID → appId");
            }
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `FINKING_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `FINKING_APP_ID` → `app_id`
/// - `FINKING_USER__DEFAULT_USER_ID` → `user.default_user_id`
/// - `FINKING_USER__MODE` → `user.mode` (`student` / `professional`)
/// - `FINKING_STORE__DATA_FILE` → `store.data_file`
/// - `FINKING_STORE__PERSIST` → `store.persist`
/// - `FINKING_SYNC__EVENT_BUFFER` → `sync.event_buffer`
/// - `FINKING_SYNC__WRITE_RETRY__MAX_ATTEMPTS` → `sync.write_retry.max_attempts`
fn apply_env_overrides(mut config: Config) -> Config {
    if let Ok(val) = std::env::var("FINKING_APP_ID") {
        config.app_id = val;
    }

    // User
    if let Ok(val) = std::env::var("FINKING_USER__DEFAULT_USER_ID") {
        config.user.default_user_id = val;
    }
    if let Ok(val) = std::env::var("FINKING_USER__MODE") {
        match val.to_ascii_lowercase().as_str() {
            "student" => config.user.mode = UserMode::Student,
            "professional" => config.user.mode = UserMode::Professional,
            other => warn!("Ignoring unknown FINKING_USER__MODE value: {}", other),
        }
    }

    // Store
    if let Ok(val) = std::env::var("FINKING_STORE__DATA_FILE") {
        config.store.data_file = val;
    }
    if let Ok(val) = std::env::var("FINKING_STORE__PERSIST") {
        config.store.persist = val == "true" || val == "1";
    }

    // Sync
    if let Ok(val) = std::env::var("FINKING_SYNC__EVENT_BUFFER") {
        if let Ok(n) = val.parse::<usize>() {
            config.sync.event_buffer = n;
        }
    }
    if let Ok(val) = std::env::var("FINKING_SYNC__WRITE_RETRY__MAX_ATTEMPTS") {
        if let Ok(n) = val.parse::<u32>() {
            config.sync.write_retry.max_attempts = n;
        }
    }

    config
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp_json(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_missing_file() {
        let config = load_config_from_path(Path::new("/nonexistent/path/config.json"));
        assert_eq!(config.sync.write_retry.initial_backoff_ms, 200);
        assert_eq!(config.app_id, "default-app-id");
    }

    #[test]
    fn test_load_valid_json() {
        let file = write_temp_json(
            r#"{
            "appId": "finking-test",
            "user": { "defaultUserId": "user123", "mode": "professional" },
            "sync": { "writeRetry": { "maxAttempts": 5 } }
        }"#,
        );

        let config = load_config_from_path(file.path());
        assert_eq!(config.app_id, "finking-test");
        assert_eq!(config.user.default_user_id, "user123");
        assert_eq!(config.user.mode, UserMode::Professional);
        assert_eq!(config.sync.write_retry.max_attempts, 5);
        // Default preserved
        assert_eq!(config.sync.write_retry.max_backoff_ms, 2000);
    }

    #[test]
    fn test_load_invalid_json_returns_defaults() {
        let file = write_temp_json("not valid json {{{");
        let config = load_config_from_path(file.path());
        assert_eq!(config.user.default_user_id, "anonymous");
        assert_eq!(config.sync.write_retry.max_attempts, 3);
    }

    #[test]
    fn test_load_wrong_types_returns_defaults() {
        let file = write_temp_json(r#"{"sync": {"eventBuffer": "lots"}, "appId": "x"}"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.app_id, "default-app-id");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.user.default_user_id = "u42".to_string();
        config.store.persist = false;

        save_config(&config, Some(&path)).unwrap();

        let reloaded = load_config_from_path(&path);
        assert_eq!(reloaded.user.default_user_id, "u42");
        assert!(!reloaded.store.persist);
    }

    #[test]
    fn test_migrate_app_id() {
        let file = write_temp_json(r#"{"appID": "legacy-app"}"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.app_id, "legacy-app");
    }

    #[test]
    fn test_migrate_no_overwrite() {
        let file = write_temp_json(r#"{"appID": "legacy-app", "appId": "current-app"}"#);
        let config = load_config_from_path(file.path());
        assert_eq!(config.app_id, "current-app");
    }

    #[test]
    fn test_env_override_data_file() {
        std::env::set_var("FINKING_STORE__DATA_FILE", "/tmp/finking-env-store.json");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.store.data_file, "/tmp/finking-env-store.json");
        std::env::remove_var("FINKING_STORE__DATA_FILE");
    }

    #[test]
    fn test_env_override_event_buffer() {
        std::env::set_var("FINKING_SYNC__EVENT_BUFFER", "32");
        let config = apply_env_overrides(Config::default());
        assert_eq!(config.sync.event_buffer, 32);
        std::env::remove_var("FINKING_SYNC__EVENT_BUFFER");
    }

    #[test]
    fn test_saved_json_uses_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        save_config(&Config::default(), Some(&path)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&content).unwrap();

        assert!(raw["sync"].get("writeRetry").is_some());
        assert!(raw["sync"].get("write_retry").is_none());
        assert_eq!(raw["user"]["mode"], "student");
    }
}
