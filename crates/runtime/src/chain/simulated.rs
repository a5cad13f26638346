//! In-process chain used by tests and the demo daemon.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use gamesync_types::{BlockHeader, Chain, ChainTip, Uint256};

use super::{ChainError, ChainInfo, ChainSource, Result};

/// Seconds between simulated block timestamps.
const BLOCK_INTERVAL_SECS: u64 = 60;

struct SimBlock {
    header: BlockHeader,
    moves: BTreeMap<String, Vec<Value>>,
}

struct Inner {
    blocks: HashMap<Uint256, SimBlock>,
    canonical: Vec<Uint256>,
    nonce: u64,
    offline: bool,
}

/// A chain that lives in memory.
///
/// Blocks are mined on top of the tip with [`SimulatedChain::attach`] and
/// removed from the canonical chain with [`SimulatedChain::detach`]. Detached
/// blocks stay queryable by hash, like stale blocks on a real node. The source
/// can be switched offline to simulate an unreachable node.
pub struct SimulatedChain {
    chain: Chain,
    inner: RwLock<Inner>,
}

impl SimulatedChain {
    /// Create a chain containing only a genesis block at height 0.
    pub fn new(chain: Chain) -> Self {
        let genesis_hash = Self::block_hash(&Uint256::ZERO, 0, 0);
        let genesis = SimBlock {
            header: BlockHeader {
                hash: genesis_hash,
                parent: Uint256::ZERO,
                height: 0,
            },
            moves: BTreeMap::new(),
        };

        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis);

        Self {
            chain,
            inner: RwLock::new(Inner {
                blocks,
                canonical: vec![genesis_hash],
                nonce: 1,
                offline: false,
            }),
        }
    }

    fn block_hash(parent: &Uint256, height: u64, nonce: u64) -> Uint256 {
        let mut hasher = Sha256::new();
        hasher.update(parent.as_bytes());
        hasher.update(height.to_le_bytes());
        hasher.update(nonce.to_le_bytes());
        Uint256::from_bytes(hasher.finalize().into())
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    /// The genesis block.
    pub fn genesis(&self) -> Result<ChainTip> {
        self.hash_at(0)
            .map(|hash| ChainTip::new(0, hash))
            .ok_or_else(|| ChainError::InvalidData("missing genesis block".to_string()))
    }

    /// Current canonical tip.
    pub fn tip(&self) -> Result<ChainTip> {
        let inner = self.inner.read().map_err(|_| ChainError::LockPoisoned)?;
        Ok(Self::tip_of(&inner))
    }

    fn tip_of(inner: &Inner) -> ChainTip {
        let height = inner.canonical.len() as u64 - 1;
        ChainTip::new(height, inner.canonical[height as usize])
    }

    /// Canonical block hash at `height`, if the chain is that long.
    pub fn hash_at(&self, height: u64) -> Option<Uint256> {
        let inner = self.inner.read().ok()?;
        inner.canonical.get(height as usize).copied()
    }

    /// Mine a new block on the current tip.
    ///
    /// `moves` pairs a game id with one move entry for that game.
    pub fn attach<'a>(
        &self,
        moves: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<BlockHeader> {
        let mut inner = self.inner.write().map_err(|_| ChainError::LockPoisoned)?;

        let parent = Self::tip_of(&inner);
        let height = parent.height + 1;
        let hash = Self::block_hash(&parent.hash, height, inner.nonce);
        inner.nonce += 1;

        let mut by_game: BTreeMap<String, Vec<Value>> = BTreeMap::new();
        for (game_id, mv) in moves {
            by_game.entry(game_id.to_string()).or_default().push(mv);
        }

        let header = BlockHeader {
            hash,
            parent: parent.hash,
            height,
        };
        inner.blocks.insert(
            hash,
            SimBlock {
                header,
                moves: by_game,
            },
        );
        inner.canonical.push(hash);

        tracing::trace!(height, %hash, "Simulated chain attached block");
        Ok(header)
    }

    /// Mine a block without any moves.
    pub fn attach_empty(&self) -> Result<BlockHeader> {
        self.attach(std::iter::empty::<(&str, Value)>())
    }

    /// Remove the tip block from the canonical chain.
    pub fn detach(&self) -> Result<BlockHeader> {
        let mut inner = self.inner.write().map_err(|_| ChainError::LockPoisoned)?;

        if inner.canonical.len() <= 1 {
            return Err(ChainError::InvalidData(
                "cannot detach the genesis block".to_string(),
            ));
        }

        let hash = inner
            .canonical
            .pop()
            .ok_or_else(|| ChainError::InvalidData("empty chain".to_string()))?;
        let header = inner
            .blocks
            .get(&hash)
            .map(|b| b.header)
            .ok_or(ChainError::BlockNotFound(hash))?;

        tracing::trace!(height = header.height, %hash, "Simulated chain detached block");
        Ok(header)
    }

    /// Toggle whether queries fail with a network error.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut inner) = self.inner.write() {
            inner.offline = offline;
        }
    }

    /// Notification-shaped payload of a block for one game.
    pub fn payload(&self, game_id: &str, hash: &Uint256) -> Result<Value> {
        let inner = self.inner.read().map_err(|_| ChainError::LockPoisoned)?;
        let block = inner
            .blocks
            .get(hash)
            .ok_or(ChainError::BlockNotFound(*hash))?;

        let moves = block.moves.get(game_id).cloned().unwrap_or_default();
        Ok(json!({
            "block": {
                "hash": block.header.hash,
                "parent": block.header.parent,
                "height": block.header.height,
                "timestamp": block.header.height * BLOCK_INTERVAL_SECS,
            },
            "moves": moves,
        }))
    }

    fn ensure_online(&self) -> Result<()> {
        let inner = self.inner.read().map_err(|_| ChainError::LockPoisoned)?;
        if inner.offline {
            return Err(ChainError::Network("simulated chain is offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChainSource for SimulatedChain {
    async fn blockchain_info(&self) -> Result<ChainInfo> {
        self.ensure_online()?;
        Ok(ChainInfo {
            chain: self.chain,
            tip: self.tip()?,
        })
    }

    async fn block_hash(&self, height: u64) -> Result<Option<Uint256>> {
        self.ensure_online()?;
        Ok(self.hash_at(height))
    }

    async fn block_data(&self, game_id: &str, hash: &Uint256) -> Result<Value> {
        self.ensure_online()?;
        self.payload(game_id, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::block_header;

    #[test]
    fn test_attach_and_detach() {
        let chain = SimulatedChain::new(Chain::Regtest);
        let genesis = chain.genesis().unwrap();

        let first = chain.attach([("game", json!({"x": 1}))]).unwrap();
        assert_eq!(first.parent, genesis.hash);
        assert_eq!(first.height, 1);
        assert_eq!(chain.tip().unwrap(), first.tip());

        let detached = chain.detach().unwrap();
        assert_eq!(detached, first);
        assert_eq!(chain.tip().unwrap(), genesis);
        assert!(chain.detach().is_err());

        // Stale blocks stay queryable.
        let payload = chain.payload("game", &first.hash).unwrap();
        assert_eq!(block_header(&payload).unwrap(), first);
        assert_eq!(payload["moves"], json!([{"x": 1}]));
        assert_eq!(chain.payload("other", &first.hash).unwrap()["moves"], json!([]));
    }

    #[test]
    fn test_competing_blocks_have_distinct_hashes() {
        let chain = SimulatedChain::new(Chain::Regtest);
        let a = chain.attach_empty().unwrap();
        chain.detach().unwrap();
        let b = chain.attach_empty().unwrap();

        assert_eq!(a.height, b.height);
        assert_ne!(a.hash, b.hash);
    }

    #[tokio::test]
    async fn test_offline_source_fails() {
        let chain = SimulatedChain::new(Chain::Main);
        chain.set_offline(true);
        assert!(matches!(
            chain.blockchain_info().await,
            Err(ChainError::Network(_))
        ));

        chain.set_offline(false);
        let info = chain.blockchain_info().await.unwrap();
        assert_eq!(info.chain, Chain::Main);
        assert_eq!(info.tip.height, 0);
    }

    #[tokio::test]
    async fn test_block_hash_follows_canonical_chain() {
        let chain = SimulatedChain::new(Chain::Regtest);
        let stale = chain.attach_empty().unwrap();
        assert_eq!(chain.block_hash(1).await.unwrap(), Some(stale.hash));

        chain.detach().unwrap();
        assert_eq!(chain.block_hash(1).await.unwrap(), None);

        let replacement = chain.attach_empty().unwrap();
        assert_eq!(chain.block_hash(1).await.unwrap(), Some(replacement.hash));
        assert_eq!(
            chain.block_hash(0).await.unwrap(),
            Some(chain.genesis().unwrap().hash)
        );
    }
}
