//! Repository layer for synced game state.
//!
//! Each game gets its own [`GameStorage`] holding:
//! - the current tip and the game state at that tip (committed as a unit)
//! - an undo journal with one record per applied block, for reorgs
//!
//! The sync controller treats states and undo data as opaque bytes.

mod error;
mod file;
mod memory;
mod records;
mod traits;

pub use error::{RepositoryError, Result};
pub use file::FileGameStorage;
pub use memory::InMemoryGameStorage;
pub use records::{StateCommit, StoredState, UndoRecord};
pub use traits::GameStorage;
