//! Records persisted by [`GameStorage`](super::GameStorage) implementations.

use gamesync_types::{ChainTip, GameStateData, Uint256, UndoData};
use serde::{Deserialize, Serialize};

/// The current tip together with the game state at that tip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredState {
    pub tip: ChainTip,
    pub state: GameStateData,
}

/// Undo journal entry for one applied block.
///
/// Stored under the `(height, hash)` of the block it reverses. The parent hash
/// lets reconciliation walk the local branch backwards without asking the
/// chain source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoRecord {
    pub parent: Uint256,
    pub undo: UndoData,
}

/// A single atomic write: new tip, state at that tip, and optionally the undo
/// record for the tip block (present for forward transitions).
#[derive(Debug, Clone)]
pub struct StateCommit {
    pub tip: ChainTip,
    pub state: GameStateData,
    pub undo: Option<UndoRecord>,
}

impl StateCommit {
    /// Commit for an initial state or a backward step; leaves the journal alone.
    pub fn without_undo(tip: ChainTip, state: GameStateData) -> Self {
        Self {
            tip,
            state,
            undo: None,
        }
    }

    /// Commit for a forward step onto `tip`.
    pub fn forward(tip: ChainTip, state: GameStateData, parent: Uint256, undo: UndoData) -> Self {
        Self {
            tip,
            state,
            undo: Some(UndoRecord { parent, undo }),
        }
    }
}
