//! File-based GameStorage implementation.

use std::fs;
use std::path::{Path, PathBuf};

use gamesync_types::Uint256;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::repository::{
    GameStorage, RepositoryError, Result, StateCommit, StoredState, UndoRecord,
};

const CURRENT_FILE: &str = "current.bin";
const UNDO_DIR: &str = "undo";

/// File-based implementation of [`GameStorage`].
///
/// # File Format
///
/// ```text
/// {base_dir}/
///   ├── current.bin                 tip + state (bincode StoredState)
///   └── undo/
///       ├── undo_{height}_{hash}.bin  (bincode UndoRecord)
///       └── ...
/// ```
///
/// Every file is written to a temp path and renamed into place. A commit
/// writes the undo record first and `current.bin` last, so the rename of
/// `current.bin` is the commit point. An undo file left behind by a crash
/// before that rename belongs to a block that is not applied and is simply
/// overwritten when the block is applied again.
pub struct FileGameStorage {
    base_dir: PathBuf,
}

impl FileGameStorage {
    /// Open (or create) a store rooted at `base_dir`.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(base_dir.join(UNDO_DIR)).map_err(RepositoryError::Io)?;
        Ok(Self { base_dir })
    }

    fn current_path(&self) -> PathBuf {
        self.base_dir.join(CURRENT_FILE)
    }

    fn undo_path(&self, height: u64, hash: &Uint256) -> PathBuf {
        self.base_dir
            .join(UNDO_DIR)
            .join(format!("undo_{}_{}.bin", height, hash))
    }

    /// Parse `undo_{height}_{hash}.bin` back into its height.
    fn parse_undo_height(filename: &str) -> Option<u64> {
        let rest = filename.strip_prefix("undo_")?.strip_suffix(".bin")?;
        let (height, hash) = rest.split_once('_')?;
        hash.parse::<Uint256>().ok()?;
        height.parse::<u64>().ok()
    }

    fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
        let temp_path = path.with_extension("bin.tmp");

        let bytes =
            bincode::serialize(value).map_err(|e| RepositoryError::Serialization(e.to_string()))?;

        fs::write(&temp_path, bytes).map_err(RepositoryError::Io)?;
        fs::rename(&temp_path, path).map_err(RepositoryError::Io)?;
        Ok(())
    }

    fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
        if !path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(path).map_err(RepositoryError::Io)?;
        let value = bincode::deserialize(&bytes).map_err(|e| {
            RepositoryError::CorruptedData(format!("{}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    fn undo_entries(&self) -> Result<Vec<(u64, PathBuf)>> {
        let mut entries = Vec::new();

        for entry in fs::read_dir(self.base_dir.join(UNDO_DIR)).map_err(RepositoryError::Io)? {
            let path = entry.map_err(RepositoryError::Io)?.path();

            if let Some(filename) = path.file_name().and_then(|s| s.to_str())
                && let Some(height) = Self::parse_undo_height(filename)
            {
                entries.push((height, path));
            }
        }

        entries.sort_by_key(|(height, _)| *height);
        Ok(entries)
    }
}

impl GameStorage for FileGameStorage {
    fn current(&self) -> Result<Option<StoredState>> {
        Self::read_optional(&self.current_path())
    }

    fn commit(&self, commit: StateCommit) -> Result<()> {
        if let Some(record) = &commit.undo {
            Self::write_atomic(&self.undo_path(commit.tip.height, &commit.tip.hash), record)?;
        }

        let stored = StoredState {
            tip: commit.tip,
            state: commit.state,
        };
        Self::write_atomic(&self.current_path(), &stored)?;

        tracing::debug!(
            height = stored.tip.height,
            hash = %stored.tip.hash,
            "Committed game state to {}",
            self.base_dir.display()
        );

        Ok(())
    }

    fn undo(&self, height: u64, hash: &Uint256) -> Result<Option<UndoRecord>> {
        Self::read_optional(&self.undo_path(height, hash))
    }

    fn prune_below(&self, height: u64) -> Result<usize> {
        let mut removed = 0;
        for (entry_height, path) in self.undo_entries()? {
            if entry_height >= height {
                break;
            }
            fs::remove_file(&path).map_err(RepositoryError::Io)?;
            removed += 1;
        }

        if removed > 0 {
            tracing::debug!("Pruned {} undo records below height {}", removed, height);
        }
        Ok(removed)
    }

    fn undo_heights(&self) -> Result<Vec<u64>> {
        Ok(self
            .undo_entries()?
            .into_iter()
            .map(|(height, _)| height)
            .collect())
    }
}
