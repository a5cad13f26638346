//! Authoritative chain access.
//!
//! The sync controller never trusts notifications alone when they disagree
//! with its local view; it asks a [`ChainSource`] for the canonical tip and for
//! the data of individual blocks instead. Production deployments back this with
//! the node's RPC interface; [`SimulatedChain`] provides an in-process chain for
//! tests and the demo daemon.

mod simulated;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use gamesync_types::{BlockHeader, Chain, ChainTip, Uint256};

pub use simulated::SimulatedChain;

/// Chain source errors.
///
/// All of these are treated as transient by the sync controller: the source
/// is an external dependency and an outage is not a local corruption.
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Block not found: {0}")]
    BlockNotFound(Uint256),

    #[error("Invalid block data: {0}")]
    InvalidData(String),

    #[error("chain source lock was poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// Network and current best block as reported by the chain source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainInfo {
    pub chain: Chain,
    pub tip: ChainTip,
}

/// Read access to the canonical chain.
#[async_trait]
pub trait ChainSource: Send + Sync {
    /// Network variant and best tip.
    async fn blockchain_info(&self) -> Result<ChainInfo>;

    /// Hash of the canonical block at `height`, `None` above the tip.
    async fn block_hash(&self, height: u64) -> Result<Option<Uint256>>;

    /// Block data for `game_id` in the same JSON shape as attach/detach
    /// notification payloads. Must also serve blocks that are no longer on
    /// the canonical chain, since undoing them needs their data.
    async fn block_data(&self, game_id: &str, hash: &Uint256) -> Result<Value>;
}

#[derive(Deserialize)]
struct PayloadBlock {
    block: BlockHeader,
}

/// Decode the `"block"` header object of a notification or block payload.
pub fn block_header(payload: &Value) -> std::result::Result<BlockHeader, serde_json::Error> {
    PayloadBlock::deserialize(payload).map(|p| p.block)
}
