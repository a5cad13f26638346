//! Daemon configuration structures and loaders.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::subscriber::SubscriberConfig;
use crate::sync::{RetryPolicy, SyncConfig};

/// Endpoint used when `GAMESYNC_ENDPOINT` is not set.
pub const DEFAULT_ENDPOINT: &str = "memory://gamesync/blocks";

/// Configuration for a sync daemon and the games it runs.
#[derive(Clone, Debug)]
pub struct DaemonConfig {
    /// Notification endpoint the subscriber connects to.
    pub endpoint: String,
    /// Root directory for per-game state. `None` keeps state in memory.
    pub data_dir: Option<PathBuf>,
    pub log_dir: PathBuf,
    /// Blocks of undo data to keep below the tip. `None` disables pruning.
    pub pruning_depth: Option<u64>,
    pub retry: RetryPolicy,
    pub suppress_dispatch: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            data_dir: None,
            log_dir: default_log_dir(),
            pruning_depth: None,
            retry: RetryPolicy::default(),
            suppress_dispatch: false,
        }
    }
}

impl DaemonConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `GAMESYNC_ENDPOINT` - Notification endpoint (default: [`DEFAULT_ENDPOINT`])
    /// - `GAMESYNC_DATA_DIR` - Directory for game state; `default` picks the
    ///   platform data directory (default: in-memory state)
    /// - `GAMESYNC_LOG_DIR` - Directory for log files (default: platform cache dir)
    /// - `GAMESYNC_ENABLE_PRUNING` - Undo blocks to keep below the tip; negative
    ///   disables pruning (default: -1)
    /// - `GAMESYNC_RETRY_ATTEMPTS` - Chain source attempts per reconciliation (default: 5)
    /// - `GAMESYNC_RETRY_BACKOFF_MS` - First retry delay in milliseconds (default: 100)
    /// - `GAMESYNC_SUPPRESS_DISPATCH` - Track notifications without processing them
    ///   (default: false)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(endpoint) = env::var("GAMESYNC_ENDPOINT") {
            config.endpoint = endpoint;
        }

        config.data_dir = env::var("GAMESYNC_DATA_DIR").ok().map(|dir| {
            if dir == "default" {
                default_data_dir()
            } else {
                PathBuf::from(dir)
            }
        });

        if let Ok(dir) = env::var("GAMESYNC_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }

        if let Some(depth) = read_env::<i64>("GAMESYNC_ENABLE_PRUNING") {
            config.pruning_depth = u64::try_from(depth).ok();
        }

        if let Some(attempts) = read_env::<u32>("GAMESYNC_RETRY_ATTEMPTS") {
            config.retry.max_attempts = attempts.max(1);
        }

        if let Some(ms) = read_env::<u64>("GAMESYNC_RETRY_BACKOFF_MS") {
            config.retry.initial_backoff = Duration::from_millis(ms);
        }

        if let Some(suppress) = read_env::<bool>("GAMESYNC_SUPPRESS_DISPATCH") {
            config.suppress_dispatch = suppress;
        }

        config
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            pruning_depth: self.pruning_depth,
            retry: self.retry,
        }
    }

    pub fn subscriber_config(&self) -> SubscriberConfig {
        SubscriberConfig {
            suppress_dispatch: self.suppress_dispatch,
        }
    }

    /// State directory of one game, if state is kept on disk.
    pub fn game_dir(&self, game_id: &str) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(game_id))
    }
}

/// Platform data directory, e.g. `~/.local/share/gamesync` on Linux.
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "gamesync")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("./gamesync_data"))
}

/// Platform log directory, e.g. `~/.cache/gamesync/logs` on Linux.
pub fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "gamesync")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/gamesync"))
        .join("logs")
}

pub(crate) fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}
