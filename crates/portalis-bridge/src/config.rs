//! Bridge configuration loaded from environment variables.
//!
//! Every setting has a default so the bridge can start with zero
//! configuration for local development.

use std::path::PathBuf;
use std::time::Duration;

use portalis_shared::constants::{DEFAULT_DATA_DIR, DEFAULT_SAVE_INTERVAL_SECS};
use portalis_store::StorePaths;

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Directory holding the snapshot files unless overridden per file.
    /// Env: `PORTALIS_DATA_DIR`
    /// Default: `./data`
    pub data_dir: PathBuf,

    /// Snapshot and sync token locations.
    /// Env: `PORTALIS_USERS_PATH`, `PORTALIS_PORTALS_PATH`,
    /// `PORTALIS_PUPPETS_PATH`, `PORTALIS_MESSAGES_PATH`, `PORTALIS_SYNC_PATH`
    /// Default: standard file names inside `data_dir`.
    pub paths: StorePaths,

    /// Time between save loop ticks.
    /// Env: `PORTALIS_SAVE_INTERVAL_SECS`
    /// Default: 30 seconds.
    pub save_interval: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            paths: StorePaths::in_dir(&data_dir),
            data_dir,
            save_interval: Duration::from_secs(DEFAULT_SAVE_INTERVAL_SECS),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = var("PORTALIS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
            config.paths = StorePaths::in_dir(&config.data_dir);
        }

        let overrides = [
            ("PORTALIS_USERS_PATH", &mut config.paths.users),
            ("PORTALIS_PORTALS_PATH", &mut config.paths.portals),
            ("PORTALIS_PUPPETS_PATH", &mut config.paths.puppets),
            ("PORTALIS_MESSAGES_PATH", &mut config.paths.messages),
            ("PORTALIS_SYNC_PATH", &mut config.paths.next_batch),
        ];
        for (name, slot) in overrides {
            if let Some(path) = var(name) {
                *slot = PathBuf::from(path);
            }
        }

        if let Some(val) = var("PORTALIS_SAVE_INTERVAL_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.save_interval = Duration::from_secs(secs),
                _ => {
                    tracing::warn!(
                        value = %val,
                        "Invalid PORTALIS_SAVE_INTERVAL_SECS, using default"
                    );
                }
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }
}
