//! Shared value types for the game-state sync daemon.
//!
//! Kept free of async and I/O so game logic implementations can depend on it
//! without pulling in the runtime.
mod block;
mod chain;
mod uint256;

pub use block::{BlockEventKind, BlockHeader, GameStateData, UndoData};
pub use chain::{Chain, ChainTip};
pub use uint256::{ParseUint256Error, UINT256_BYTES, UINT256_HEX_LEN, Uint256};
