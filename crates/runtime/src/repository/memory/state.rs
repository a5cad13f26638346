//! In-memory GameStorage implementation for tests and local runs.

use std::collections::BTreeMap;
use std::sync::RwLock;

use gamesync_types::Uint256;

use crate::repository::{
    GameStorage, RepositoryError, Result, StateCommit, StoredState, UndoRecord,
};

#[derive(Default)]
struct Inner {
    current: Option<StoredState>,
    undo: BTreeMap<(u64, Uint256), UndoRecord>,
}

/// In-memory implementation of [`GameStorage`].
///
/// A single lock covers tip, state and journal, so commits are atomic with
/// respect to concurrent readers.
pub struct InMemoryGameStorage {
    inner: RwLock<Inner>,
}

impl InMemoryGameStorage {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
        }
    }
}

impl Default for InMemoryGameStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl GameStorage for InMemoryGameStorage {
    fn current(&self) -> Result<Option<StoredState>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(inner.current.clone())
    }

    fn commit(&self, commit: StateCommit) -> Result<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;

        if let Some(record) = commit.undo {
            inner
                .undo
                .insert((commit.tip.height, commit.tip.hash), record);
        }
        inner.current = Some(StoredState {
            tip: commit.tip,
            state: commit.state,
        });
        Ok(())
    }

    fn undo(&self, height: u64, hash: &Uint256) -> Result<Option<UndoRecord>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(inner.undo.get(&(height, *hash)).cloned())
    }

    fn prune_below(&self, height: u64) -> Result<usize> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| RepositoryError::LockPoisoned)?;

        let kept = inner.undo.split_off(&(height, Uint256::ZERO));
        let removed = inner.undo.len();
        inner.undo = kept;
        Ok(removed)
    }

    fn undo_heights(&self) -> Result<Vec<u64>> {
        let inner = self
            .inner
            .read()
            .map_err(|_| RepositoryError::LockPoisoned)?;
        Ok(inner.undo.keys().map(|(height, _)| *height).collect())
    }
}
