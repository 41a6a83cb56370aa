//! Configuration schema.
//!
//! Hierarchy: `Config` → `UserConfig`, `StoreConfig`, `SyncConfig` → `RetryConfig`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.
//! We use `#[serde(rename_all = "camelCase")]` to handle the conversion.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{UserId, UserMode};

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.finking/config.json` + env vars.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Application identifier scoping every store path.
    pub app_id: String,
    pub user: UserConfig,
    pub store: StoreConfig,
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_id: "default-app-id".to_string(),
            user: UserConfig::default(),
            store: StoreConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────
// User
// ─────────────────────────────────────────────

/// Identity used when no sign-in happened, plus the initial mode.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserConfig {
    pub default_user_id: String,
    pub mode: UserMode,
}

impl Default for UserConfig {
    fn default() -> Self {
        Self {
            default_user_id: "anonymous".to_string(),
            mode: UserMode::Student,
        }
    }
}

impl UserConfig {
    pub fn default_user(&self) -> UserId {
        UserId::new(self.default_user_id.clone())
    }
}

// ─────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────

/// Local document store settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    /// JSON file backing the store (`~` is expanded).
    pub data_file: String,
    /// Write the store to `data_file` after every mutation.
    pub persist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_file: "~/.finking/store.json".to_string(),
            persist: true,
        }
    }
}

// ─────────────────────────────────────────────
// Sync
// ─────────────────────────────────────────────

/// Chat core tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    /// Capacity of the event bus between core and view.
    pub event_buffer: usize,
    pub write_retry: RetryConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            event_buffer: 256,
            write_retry: RetryConfig::default(),
        }
    }
}

/// Exponential backoff for merge-writes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts including the first one. `0` is treated as `1`.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 200,
            max_backoff_ms: 2000,
        }
    }
}

impl RetryConfig {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (1-based), doubling each time and
    /// capped at `max_backoff_ms`.
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u64 << retry.saturating_sub(1).min(20);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.app_id, "default-app-id");
        assert_eq!(config.user.default_user_id, "anonymous");
        assert_eq!(config.user.mode, UserMode::Student);
        assert!(config.store.persist);
        assert_eq!(config.sync.event_buffer, 256);
        assert_eq!(config.sync.write_retry.max_attempts, 3);
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let retry = RetryConfig {
            max_attempts: 6,
            initial_backoff_ms: 100,
            max_backoff_ms: 500,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(400));
        assert_eq!(retry.backoff(4), Duration::from_millis(500));
        assert_eq!(retry.backoff(60), Duration::from_millis(500));
    }

    #[test]
    fn test_zero_attempts_means_one() {
        let retry = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(retry.attempts(), 1);
        assert_eq!(RetryConfig::none().attempts(), 1);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config = serde_json::from_str(r#"{"sync": {"eventBuffer": 8}}"#).unwrap();
        assert_eq!(config.sync.event_buffer, 8);
        assert_eq!(config.sync.write_retry, RetryConfig::default());
        assert_eq!(config.app_id, "default-app-id");
    }
}
