//! Chain synchronization controller.
//!
//! A [`GameSync`] owns the local tip of one game and keeps it on the
//! canonical chain. It is registered as a [`BlockListener`] on the
//! subscriber and therefore runs entirely on the subscriber worker.
//!
//! [`BlockListener`]: crate::subscriber::BlockListener

mod controller;
mod retry;

use strum::{AsRefStr, Display};

use gamesync_types::ChainTip;

use crate::chain::ChainError;
use crate::repository::RepositoryError;

pub use controller::GameSync;
pub use retry::RetryPolicy;

/// Where the controller stands relative to the canonical chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
pub enum SyncState {
    /// No tip has been loaded or created yet.
    Uninitialized,
    /// The local tip is believed to be the canonical tip.
    Synced,
    /// Forward steps toward the canonical tip are pending.
    CatchingUp,
    /// Blocks of an abandoned branch are being undone.
    Reorganizing,
}

/// Snapshot published on every state or tip change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStatus {
    pub state: SyncState,
    pub tip: Option<ChainTip>,
}

impl SyncStatus {
    pub const fn uninitialized() -> Self {
        Self {
            state: SyncState::Uninitialized,
            tip: None,
        }
    }
}

/// Controller options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncConfig {
    /// Keep undo data for this many blocks below the tip. `None` keeps all.
    pub pruning_depth: Option<u64>,
    pub retry: RetryPolicy,
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("chain source error: {0}")]
    Chain(#[from] ChainError),

    #[error("storage error: {0}")]
    Storage(#[from] RepositoryError),

    #[error("game {0} is not initialized")]
    NotInitialized(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;
