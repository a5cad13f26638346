//! Shared fixtures for the runtime integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::watch;

use gamesync_runtime::logic::Result as LogicResult;
use gamesync_runtime::{
    DaemonConfig, ForwardOutput, GameLogic, GameLogicError, GameNames, InitialState,
    MemoryTransport, NotificationPublisher, RetryPolicy, SimulatedChain, SyncState, SyncStatus,
};
use gamesync_types::{BlockEventKind, BlockHeader, Chain, ChainTip, GameStateData, UndoData};

pub const ENDPOINT: &str = "memory://test/blocks";

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Game logic call, by block height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Forward(u64),
    Backward(u64),
}

#[derive(Debug, Serialize, Deserialize)]
struct SumState {
    total: i64,
    blocks: u64,
}

/// Adds up the integer moves of every block.
pub struct SumGame {
    id: String,
    initial: ChainTip,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl SumGame {
    pub fn new(id: &str, initial: ChainTip) -> Self {
        Self {
            id: id.to_string(),
            initial,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<Mutex<Vec<Call>>> {
        Arc::clone(&self.calls)
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

fn decode(state: &GameStateData) -> LogicResult<SumState> {
    serde_json::from_slice(state.as_bytes())
        .map_err(|e| GameLogicError::InvalidState(e.to_string()))
}

fn encode(state: &SumState) -> GameStateData {
    GameStateData::from(serde_json::to_vec(state).unwrap())
}

/// Total of a [`SumGame`] state.
pub fn total(state: &GameStateData) -> i64 {
    decode(state).unwrap().total
}

fn height(block: &Value) -> LogicResult<u64> {
    block["block"]["height"]
        .as_u64()
        .ok_or_else(|| GameLogicError::InvalidBlock("missing height".to_string()))
}

impl GameLogic for SumGame {
    fn names(&mut self) -> LogicResult<GameNames> {
        Ok(GameNames {
            id: self.id.clone(),
            name: format!("Sum game {}", self.id),
            version: "1.0.0".to_string(),
        })
    }

    fn initial_state(&mut self, _chain: Chain) -> LogicResult<InitialState> {
        Ok(InitialState {
            state: encode(&SumState {
                total: 0,
                blocks: 0,
            }),
            height: self.initial.height,
            hash: self.initial.hash,
        })
    }

    fn process_forward(
        &mut self,
        _chain: Chain,
        old_state: &GameStateData,
        block: &Value,
    ) -> LogicResult<ForwardOutput> {
        let mut state = decode(old_state)?;
        let delta: i64 = block["moves"]
            .as_array()
            .map(|moves| moves.iter().filter_map(Value::as_i64).sum())
            .unwrap_or_default();

        state.total += delta;
        state.blocks += 1;
        self.record(Call::Forward(height(block)?));

        Ok(ForwardOutput {
            new_state: encode(&state),
            undo: UndoData::from(delta.to_le_bytes().to_vec()),
        })
    }

    fn process_backwards(
        &mut self,
        _chain: Chain,
        new_state: &GameStateData,
        block: &Value,
        undo: &UndoData,
    ) -> LogicResult<GameStateData> {
        let mut state = decode(new_state)?;
        let delta = undo
            .as_bytes()
            .try_into()
            .map(i64::from_le_bytes)
            .map_err(|_| GameLogicError::InvalidUndo("expected 8 bytes".to_string()))?;

        state.total -= delta;
        state.blocks -= 1;
        self.record(Call::Backward(height(block)?));

        Ok(encode(&state))
    }
}

/// Simulated chain plus a publisher that announces its blocks.
pub struct Harness {
    pub chain: Arc<SimulatedChain>,
    pub transport: MemoryTransport,
    pub publisher: NotificationPublisher,
}

impl Harness {
    pub fn new() -> Self {
        let transport = MemoryTransport::new();
        Self {
            chain: Arc::new(SimulatedChain::new(Chain::Regtest)),
            publisher: transport.publisher(ENDPOINT),
            transport,
        }
    }

    pub fn genesis(&self) -> ChainTip {
        self.chain.genesis().unwrap()
    }

    pub fn config(&self) -> DaemonConfig {
        DaemonConfig {
            endpoint: ENDPOINT.to_string(),
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
            },
            ..Default::default()
        }
    }

    /// Mine a block without announcing it.
    pub fn mine_silently(&self, moves: &[(&str, i64)]) -> BlockHeader {
        self.chain
            .attach(moves.iter().map(|(game, value)| (*game, json!(value))))
            .unwrap()
    }

    /// Mine a block and announce it to `games`.
    pub fn mine(&self, games: &[&str], moves: &[(&str, i64)]) -> BlockHeader {
        let header = self.mine_silently(moves);
        self.announce(BlockEventKind::Attach, games, &header);
        header
    }

    /// Detach the tip and announce it to `games`.
    pub fn detach(&self, games: &[&str]) -> BlockHeader {
        let header = self.chain.detach().unwrap();
        self.announce(BlockEventKind::Detach, games, &header);
        header
    }

    pub fn announce(&self, kind: BlockEventKind, games: &[&str], header: &BlockHeader) {
        for game in games {
            let payload = self.chain.payload(game, &header.hash).unwrap();
            self.publisher.publish(kind, game, &payload).unwrap();
        }
    }
}

/// Wait until the status reports `Synced` at `tip`.
pub async fn wait_synced_at(rx: &mut watch::Receiver<SyncStatus>, tip: ChainTip) -> SyncStatus {
    wait_until(rx, |status| {
        status.state == SyncState::Synced && status.tip == Some(tip)
    })
    .await
}

pub async fn wait_until(
    rx: &mut watch::Receiver<SyncStatus>,
    predicate: impl FnMut(&SyncStatus) -> bool,
) -> SyncStatus {
    let status = tokio::time::timeout(WAIT_TIMEOUT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for sync status")
        .expect("sync controller dropped");
    *status
}
