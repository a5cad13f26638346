//! Repository contract for the synced game state and its undo journal.

use gamesync_types::Uint256;

use super::error::Result;
use super::records::{StateCommit, StoredState, UndoRecord};

/// Persistent store for one game.
///
/// Holds the current tip + state as a unit, and an undo journal keyed by the
/// `(height, hash)` of each applied block. Implementations must make
/// [`GameStorage::commit`] atomic: after a crash either the whole commit is
/// visible or none of the tip/state change is.
pub trait GameStorage: Send + Sync {
    /// Load the current tip and state, `None` before the first commit.
    fn current(&self) -> Result<Option<StoredState>>;

    /// Atomically replace tip + state and, if present, store the undo record
    /// under the new tip.
    fn commit(&self, commit: StateCommit) -> Result<()>;

    /// Load the undo record of an applied block.
    fn undo(&self, height: u64, hash: &Uint256) -> Result<Option<UndoRecord>>;

    /// Remove undo records for all blocks strictly below `height`.
    ///
    /// Returns how many records were removed.
    fn prune_below(&self, height: u64) -> Result<usize>;

    /// Heights that currently have undo records, ascending (with duplicates
    /// for competing blocks at one height).
    fn undo_heights(&self) -> Result<Vec<u64>> {
        Ok(vec![])
    }
}
