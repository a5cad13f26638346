//! Game logic capability interface.
//!
//! The sync controller drives a game purely through [`GameLogic`]. Rust games
//! implement the trait directly; logic living behind a buffer-passing boundary
//! (another language, another process) is wrapped with [`BufferedGameLogic`].
//!
//! Contract for implementations:
//! - [`GameLogic::process_forward`] returns undo data that holds everything
//!   needed to reverse that exact transition.
//! - [`GameLogic::process_backwards`] returns the **old** state, byte-identical
//!   to the state that was passed to the matching forward call.

mod buffered;

use serde_json::Value;

use gamesync_types::{Chain, ChainTip, GameStateData, Uint256, UndoData};

pub use buffered::{
    BufferedCallee, BufferedGameLogic, CallStatus, ForwardWritten, INITIAL_BUFFER_SIZE,
    InitialStateWritten, NamesWritten,
};

/// Errors reported by game logic implementations.
#[derive(Debug, thiserror::Error)]
pub enum GameLogicError {
    #[error("invalid game state: {0}")]
    InvalidState(String),

    #[error("invalid block data: {0}")]
    InvalidBlock(String),

    #[error("invalid undo data: {0}")]
    InvalidUndo(String),
}

pub type Result<T> = std::result::Result<T, GameLogicError>;

/// Identification of a game implementation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameNames {
    pub id: String,
    pub name: String,
    pub version: String,
}

/// State the game starts from, and the block it corresponds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialState {
    pub state: GameStateData,
    pub height: u64,
    pub hash: Uint256,
}

impl InitialState {
    pub fn tip(&self) -> ChainTip {
        ChainTip::new(self.height, self.hash)
    }
}

/// Result of a forward transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardOutput {
    pub new_state: GameStateData,
    pub undo: UndoData,
}

/// Game rules as seen by the sync controller.
pub trait GameLogic: Send {
    /// Game id, display name and version.
    fn names(&mut self) -> Result<GameNames>;

    /// Initial state for the given network.
    fn initial_state(&mut self, chain: Chain) -> Result<InitialState>;

    /// Apply one block.
    fn process_forward(
        &mut self,
        chain: Chain,
        old_state: &GameStateData,
        block: &Value,
    ) -> Result<ForwardOutput>;

    /// Undo one block, returning the state before it.
    fn process_backwards(
        &mut self,
        chain: Chain,
        new_state: &GameStateData,
        block: &Value,
        undo: &UndoData,
    ) -> Result<GameStateData>;
}

impl<T: GameLogic + ?Sized> GameLogic for Box<T> {
    fn names(&mut self) -> Result<GameNames> {
        (**self).names()
    }

    fn initial_state(&mut self, chain: Chain) -> Result<InitialState> {
        (**self).initial_state(chain)
    }

    fn process_forward(
        &mut self,
        chain: Chain,
        old_state: &GameStateData,
        block: &Value,
    ) -> Result<ForwardOutput> {
        (**self).process_forward(chain, old_state, block)
    }

    fn process_backwards(
        &mut self,
        chain: Chain,
        new_state: &GameStateData,
        block: &Value,
        undo: &UndoData,
    ) -> Result<GameStateData> {
        (**self).process_backwards(chain, new_state, block, undo)
    }
}
