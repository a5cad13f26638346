//! Scripted chain activity for the demo daemon.
//!
//! Mines blocks with moves for the demo games on a [`SimulatedChain`] and
//! announces them through a [`NotificationPublisher`], with periodic reorgs
//! and dropped notifications to exercise catch-up.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde_json::{Value, json};
use tracing::{debug, info};

use gamesync_runtime::{NotificationPublisher, SimulatedChain, SyncDaemon, SyncState};
use gamesync_types::{BlockEventKind, BlockHeader, Chain};

use crate::{registry, tally};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub chain: Chain,
    pub blocks: u64,
    pub interval: Duration,
    /// Reorg on every n-th block. Zero disables reorgs.
    pub reorg_every: u64,
    pub reorg_depth: u64,
    /// Drop every n-th notification. Zero delivers everything.
    pub drop_every: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            chain: Chain::Regtest,
            blocks: 20,
            interval: Duration::from_millis(200),
            reorg_every: 7,
            reorg_depth: 2,
            drop_every: 11,
        }
    }
}

impl SimulationConfig {
    /// Construct configuration from process environment variables.
    ///
    /// Environment variables:
    /// - `GAMESYNC_SIM_CHAIN` - `main`, `test` or `regtest` (default: regtest)
    /// - `GAMESYNC_SIM_BLOCKS` - Blocks to mine (default: 20)
    /// - `GAMESYNC_SIM_INTERVAL_MS` - Delay between blocks (default: 200)
    /// - `GAMESYNC_SIM_REORG_EVERY` - Reorg period in blocks, 0 disables (default: 7)
    /// - `GAMESYNC_SIM_REORG_DEPTH` - Blocks replaced per reorg (default: 2)
    /// - `GAMESYNC_SIM_DROP_EVERY` - Drop period in notifications, 0 disables (default: 11)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(chain) = read_env::<Chain>("GAMESYNC_SIM_CHAIN") {
            config.chain = chain;
        }
        if let Some(blocks) = read_env("GAMESYNC_SIM_BLOCKS") {
            config.blocks = blocks;
        }
        if let Some(ms) = read_env("GAMESYNC_SIM_INTERVAL_MS") {
            config.interval = Duration::from_millis(ms);
        }
        if let Some(every) = read_env("GAMESYNC_SIM_REORG_EVERY") {
            config.reorg_every = every;
        }
        if let Some(depth) = read_env("GAMESYNC_SIM_REORG_DEPTH") {
            config.reorg_depth = depth;
        }
        if let Some(every) = read_env("GAMESYNC_SIM_DROP_EVERY") {
            config.drop_every = every;
        }

        config
    }
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

pub struct Simulation {
    config: SimulationConfig,
    chain: Arc<SimulatedChain>,
    publisher: NotificationPublisher,
    announced: u64,
}

impl Simulation {
    pub fn new(
        config: SimulationConfig,
        chain: Arc<SimulatedChain>,
        publisher: NotificationPublisher,
    ) -> Self {
        Self {
            config,
            chain,
            publisher,
            announced: 0,
        }
    }

    /// Mine the configured blocks, then wait until every game of `daemon`
    /// is synced at the chain tip.
    pub async fn run(&mut self, daemon: &SyncDaemon) -> Result<()> {
        info!(
            blocks = self.config.blocks,
            reorg_every = self.config.reorg_every,
            drop_every = self.config.drop_every,
            "Starting simulation"
        );

        for round in 1..=self.config.blocks {
            if self.config.reorg_every > 0 && round % self.config.reorg_every == 0 {
                self.reorg(round)?;
            } else {
                self.mine(round, true)?;
            }
            tokio::time::sleep(self.config.interval).await;
        }

        // Delivered unconditionally so games that missed the last
        // notifications still learn about the final tip.
        self.mine(self.config.blocks + 1, false)?;
        self.settle(daemon).await
    }

    fn moves(round: u64) -> Vec<(&'static str, Value)> {
        vec![
            (
                registry::GAME_ID,
                json!({"name": format!("player{}", round % 5), "value": format!("round {}", round)}),
            ),
            (tally::GAME_ID, json!({"round": round})),
            (tally::GAME_ID, json!({"round": round, "bonus": true})),
        ]
    }

    fn mine(&mut self, round: u64, may_drop: bool) -> Result<BlockHeader> {
        let header = self.chain.attach(Self::moves(round))?;
        info!(height = header.height, hash = %header.hash, "Mined block");
        self.announce(BlockEventKind::Attach, &header, may_drop)?;
        Ok(header)
    }

    fn reorg(&mut self, round: u64) -> Result<()> {
        let tip = self.chain.tip()?;
        let depth = self.config.reorg_depth.min(tip.height);
        info!(depth, from = %tip, "Simulating reorg");

        for _ in 0..depth {
            let header = self.chain.detach()?;
            self.announce(BlockEventKind::Detach, &header, true)?;
        }
        for _ in 0..=depth {
            self.mine(round, true)?;
        }
        Ok(())
    }

    fn announce(
        &mut self,
        kind: BlockEventKind,
        header: &BlockHeader,
        may_drop: bool,
    ) -> Result<()> {
        for game_id in [registry::GAME_ID, tally::GAME_ID] {
            self.announced += 1;
            let every = self.config.drop_every;
            if may_drop && every > 0 && self.announced % every == 0 {
                debug!(%kind, game_id, height = header.height, "Dropping notification");
                self.publisher.skip(kind, game_id, 1)?;
                continue;
            }

            let payload = self.chain.payload(game_id, &header.hash)?;
            self.publisher.publish(kind, game_id, &payload)?;
        }
        Ok(())
    }

    async fn settle(&self, daemon: &SyncDaemon) -> Result<()> {
        let tip = self.chain.tip()?;

        for names in daemon.games() {
            let wait = daemon.wait_for(&names.id, |status| {
                status.state == SyncState::Synced && status.tip == Some(tip)
            });
            let status = tokio::time::timeout(SETTLE_TIMEOUT, wait)
                .await
                .with_context(|| format!("game {} did not reach {}", names.id, tip))?;

            let Some(status) = status else {
                bail!("game {} stopped before reaching {}", names.id, tip);
            };
            info!(game_id = %names.id, state = %status.state, %tip, "Game settled");
        }
        Ok(())
    }
}
