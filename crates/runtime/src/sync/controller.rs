//! Per-game sync state machine.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use gamesync_types::{BlockHeader, Chain, ChainTip, GameStateData};

use crate::chain::{ChainError, ChainSource, block_header};
use crate::logic::GameLogic;
use crate::repository::{GameStorage, StateCommit, StoredState};
use crate::subscriber::{BlockListener, BlockNotification};

use super::retry::retry;
use super::{Result, SyncConfig, SyncError, SyncState, SyncStatus};

/// Everything known locally once the game is initialized.
struct LocalView {
    network: Chain,
    initial: ChainTip,
    current: StoredState,
}

impl LocalView {
    /// Blocks at or below the initial height say nothing about a game that
    /// still sits on its initial state.
    fn predates_initial(&self, header: &BlockHeader) -> bool {
        self.current.tip == self.initial && header.height <= self.initial.height
    }
}

/// A block fetched for one reconciliation step.
struct Step {
    header: BlockHeader,
    block: Value,
}

/// Keeps one game's state on the canonical chain.
///
/// Attach and detach notifications that extend or shorten the local tip by
/// exactly one block are applied directly. Anything else (a gap in sequence
/// numbers, a block that does not connect, a notification while not synced)
/// makes the controller ask the chain source for the canonical tip and walk
/// there: undo local blocks down to the fork point, then apply the canonical
/// branch. Every step is committed on its own, so an interrupted walk resumes
/// from the last committed block.
///
/// # Failure handling
///
/// - Chain source errors are retried with backoff, then the controller waits
///   for the next notification.
/// - Storage errors leave the tip where it was and drop out of
///   [`SyncState::Synced`].
/// - Game logic errors and reorgs deeper than the undo journal panic.
pub struct GameSync {
    game_id: String,
    logic: Box<dyn GameLogic>,
    storage: Arc<dyn GameStorage>,
    chain: Arc<dyn ChainSource>,
    config: SyncConfig,
    state: SyncState,
    local: Option<LocalView>,
    status_tx: watch::Sender<SyncStatus>,
}

impl GameSync {
    pub fn new(
        game_id: impl Into<String>,
        logic: Box<dyn GameLogic>,
        storage: Arc<dyn GameStorage>,
        chain: Arc<dyn ChainSource>,
        config: SyncConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SyncStatus::uninitialized());

        Self {
            game_id: game_id.into(),
            logic,
            storage,
            chain,
            config,
            state: SyncState::Uninitialized,
            local: None,
            status_tx,
        }
    }

    pub fn game_id(&self) -> &str {
        &self.game_id
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn tip(&self) -> Option<ChainTip> {
        self.local.as_ref().map(|local| local.current.tip)
    }

    pub fn current_state(&self) -> Option<&GameStateData> {
        self.local.as_ref().map(|local| &local.current.state)
    }

    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            state: self.state,
            tip: self.tip(),
        }
    }

    /// Watch the status. Keeps working after the controller has been moved
    /// into the subscriber.
    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status_tx.subscribe()
    }

    /// Load the stored tip, or store the game's initial state when there is
    /// none, then catch up with the canonical chain.
    ///
    /// Fails if the chain source cannot be reached for the network variant
    /// or the store cannot be read. Failing to catch up is not an error; the
    /// next notification tries again.
    pub async fn initialize(&mut self) -> Result<SyncStatus> {
        let chain = Arc::clone(&self.chain);
        let info = retry(self.config.retry, "query chain info", || {
            chain.blockchain_info()
        })
        .await?;

        let initial = self
            .logic
            .initial_state(info.chain)
            .unwrap_or_else(|e| panic!("game {} has no initial state: {}", self.game_id, e));
        let initial_tip = initial.tip();

        let current = match self.storage.current()? {
            Some(stored) => {
                info!(game_id = %self.game_id, tip = %stored.tip, "Resuming from stored state");
                stored
            }
            None => {
                self.storage.commit(StateCommit::without_undo(
                    initial_tip,
                    initial.state.clone(),
                ))?;
                info!(game_id = %self.game_id, tip = %initial_tip, "Stored initial state");
                StoredState {
                    tip: initial_tip,
                    state: initial.state,
                }
            }
        };

        self.local = Some(LocalView {
            network: info.chain,
            initial: initial_tip,
            current,
        });
        self.set_state(SyncState::Synced);

        self.reconcile_with_retry().await;
        Ok(self.status())
    }

    async fn handle_attach(&mut self, notification: &BlockNotification) {
        let header = Self::notification_header(notification);
        let Some(local) = &self.local else {
            warn!(game_id = %self.game_id, "Ignoring attach before initialization");
            return;
        };

        let tip = local.current.tip;
        if header.hash == tip.hash {
            trace!(game_id = %self.game_id, %tip, "Attached block is already the local tip");
            return;
        }
        if local.predates_initial(&header) {
            trace!(
                game_id = %self.game_id,
                height = header.height,
                "Ignoring attach before initial block"
            );
            return;
        }

        if self.state == SyncState::Synced
            && !notification.seq_mismatch
            && header.parent == tip.hash
        {
            if let Err(e) = self.apply_forward(&header, &notification.payload) {
                self.fail(e);
            }
            return;
        }

        debug!(
            game_id = %self.game_id,
            block = %header.tip(),
            %tip,
            seq_mismatch = notification.seq_mismatch,
            state = %self.state,
            "Attach does not extend local tip, reconciling"
        );
        self.reconcile_with_retry().await;
    }

    async fn handle_detach(&mut self, notification: &BlockNotification) {
        let header = Self::notification_header(notification);
        let Some(local) = &self.local else {
            warn!(game_id = %self.game_id, "Ignoring detach before initialization");
            return;
        };

        let tip = local.current.tip;
        if local.predates_initial(&header) {
            trace!(
                game_id = %self.game_id,
                height = header.height,
                "Ignoring detach before initial block"
            );
            return;
        }

        if self.state == SyncState::Synced && !notification.seq_mismatch && header.hash == tip.hash
        {
            if let Err(e) = self.apply_backward(&notification.payload) {
                self.fail(e);
            }
            return;
        }

        debug!(
            game_id = %self.game_id,
            block = %header.tip(),
            %tip,
            seq_mismatch = notification.seq_mismatch,
            state = %self.state,
            "Detach does not match local tip, reconciling"
        );
        self.reconcile_with_retry().await;
    }

    fn notification_header(notification: &BlockNotification) -> BlockHeader {
        block_header(&notification.payload).unwrap_or_else(|e| {
            panic!(
                "{} notification for game {} has no valid block header: {}",
                notification.kind, notification.game_id, e
            )
        })
    }

    /// Apply `header` on top of the local tip and commit the result.
    fn apply_forward(&mut self, header: &BlockHeader, block: &Value) -> Result<()> {
        let Some(local) = self.local.as_ref() else {
            return Err(SyncError::NotInitialized(self.game_id.clone()));
        };
        debug_assert_eq!(header.parent, local.current.tip.hash);

        let tip = header.tip();
        let output = self
            .logic
            .process_forward(local.network, &local.current.state, block)
            .unwrap_or_else(|e| panic!("game {} failed to apply block {}: {}", self.game_id, tip, e));

        self.storage.commit(StateCommit::forward(
            tip,
            output.new_state.clone(),
            header.parent,
            output.undo,
        ))?;
        self.set_current(StoredState {
            tip,
            state: output.new_state,
        });
        debug!(game_id = %self.game_id, %tip, "Applied block");

        self.prune(tip.height);
        Ok(())
    }

    /// Undo the local tip block, whose data is `block`.
    fn apply_backward(&mut self, block: &Value) -> Result<()> {
        let Some(local) = self.local.as_ref() else {
            return Err(SyncError::NotInitialized(self.game_id.clone()));
        };

        let tip = local.current.tip;
        let Some(record) = self.storage.undo(tip.height, &tip.hash)? else {
            panic!(
                "reorg of game {} is deeper than the undo journal: no undo data for {}",
                self.game_id, tip
            );
        };

        let old_state = self
            .logic
            .process_backwards(local.network, &local.current.state, block, &record.undo)
            .unwrap_or_else(|e| panic!("game {} failed to undo block {}: {}", self.game_id, tip, e));

        let parent = ChainTip::new(tip.height.saturating_sub(1), record.parent);
        self.storage
            .commit(StateCommit::without_undo(parent, old_state.clone()))?;
        self.set_current(StoredState {
            tip: parent,
            state: old_state,
        });
        debug!(game_id = %self.game_id, undone = %tip, %parent, "Undid block");

        Ok(())
    }

    fn prune(&self, height: u64) {
        let Some(depth) = self.config.pruning_depth else {
            return;
        };
        let Some(below) = height.checked_sub(depth) else {
            return;
        };

        match self.storage.prune_below(below) {
            Ok(0) => {}
            Ok(removed) => trace!(game_id = %self.game_id, removed, below, "Pruned undo data"),
            Err(e) => warn!(game_id = %self.game_id, "Failed to prune undo data: {}", e),
        }
    }

    async fn reconcile_with_retry(&mut self) {
        let attempts = self.config.retry.attempts();

        for attempt in 1..=attempts {
            match self.reconcile().await {
                Ok(()) => return,
                Err(SyncError::Chain(e)) if attempt < attempts => {
                    let delay = self.config.retry.backoff(attempt);
                    warn!(
                        game_id = %self.game_id,
                        attempt,
                        ?delay,
                        "Reconciliation failed, retrying: {}",
                        e
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    self.fail(e);
                    return;
                }
            }
        }
    }

    /// Walk from the local tip to the canonical tip.
    ///
    /// Local blocks that left the canonical chain are undone newest first,
    /// then canonical blocks are applied in order. Each block is fetched right
    /// before its step and the step is committed on its own, so an error part
    /// way keeps all earlier steps and the next attempt resumes from there.
    async fn reconcile(&mut self) -> Result<()> {
        let chain = Arc::clone(&self.chain);
        let target = chain.blockchain_info().await?.tip;

        let Some(local) = self.local.as_ref() else {
            return Err(SyncError::NotInitialized(self.game_id.clone()));
        };
        let local_tip = local.current.tip;
        let initial = local.initial;

        if target == local_tip {
            self.set_state(SyncState::Synced);
            return Ok(());
        }
        if local_tip == initial && target.height < initial.height {
            debug!(
                game_id = %self.game_id,
                %target,
                %initial,
                "Chain has not reached the initial block"
            );
            self.set_state(SyncState::Synced);
            return Ok(());
        }

        let mut undone = 0usize;
        loop {
            let tip = self.local_tip()?;
            if chain.block_hash(tip.height).await? == Some(tip.hash) {
                break;
            }
            if undone == 0 {
                info!(game_id = %self.game_id, from = %tip, to = %target, "Reorganizing");
                self.set_state(SyncState::Reorganizing);
            }

            let step = Self::fetch_step(chain.as_ref(), &self.game_id, tip).await?;
            self.apply_backward(&step.block)?;
            undone += 1;
        }

        let fork = self.local_tip()?;
        if undone > 0 {
            info!(game_id = %self.game_id, %fork, undone, "Reached fork point");
        }
        if fork.height < target.height {
            debug!(
                game_id = %self.game_id,
                from = %fork,
                to = %target,
                blocks = target.height - fork.height,
                "Catching up"
            );
            self.set_state(SyncState::CatchingUp);
        }

        loop {
            let tip = self.local_tip()?;
            if tip.height >= target.height {
                break;
            }

            let height = tip.height + 1;
            let Some(hash) = chain.block_hash(height).await? else {
                return Err(ChainError::InvalidData(format!(
                    "no canonical block at height {} while catching up to {}",
                    height, target
                ))
                .into());
            };

            let step =
                Self::fetch_step(chain.as_ref(), &self.game_id, ChainTip::new(height, hash))
                    .await?;
            if step.header.parent != tip.hash {
                // The chain moved during the walk; the next attempt starts over
                // from the fork point.
                return Err(ChainError::InvalidData(format!(
                    "block {} does not extend local tip {}",
                    step.header.tip(),
                    tip
                ))
                .into());
            }
            self.apply_forward(&step.header, &step.block)?;
        }

        self.set_state(SyncState::Synced);
        Ok(())
    }

    fn local_tip(&self) -> Result<ChainTip> {
        self.tip()
            .ok_or_else(|| SyncError::NotInitialized(self.game_id.clone()))
    }

    async fn fetch_step(chain: &dyn ChainSource, game_id: &str, tip: ChainTip) -> Result<Step> {
        let block = chain.block_data(game_id, &tip.hash).await?;
        let header = block_header(&block)
            .map_err(|e| ChainError::InvalidData(format!("block {}: {}", tip, e)))?;

        if header.tip() != tip {
            return Err(ChainError::InvalidData(format!(
                "requested block {}, got {}",
                tip,
                header.tip()
            ))
            .into());
        }

        Ok(Step { header, block })
    }

    fn fail(&mut self, e: SyncError) {
        error!(game_id = %self.game_id, "Game state not updated: {}", e);
        if self.state != SyncState::Uninitialized {
            self.set_state(SyncState::CatchingUp);
        }
    }

    fn set_current(&mut self, current: StoredState) {
        if let Some(local) = self.local.as_mut() {
            local.current = current;
        }
        self.publish_status();
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            debug!(game_id = %self.game_id, from = %self.state, to = %state, "Sync state changed");
            self.state = state;
        }
        self.publish_status();
    }

    fn publish_status(&self) {
        let status = self.status();
        self.status_tx.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
    }
}

#[async_trait]
impl BlockListener for GameSync {
    /// Blocks announced between [`GameSync::initialize`] and the subscriber
    /// connecting were never delivered. Catch up with them now.
    async fn started(&mut self) {
        if self.local.is_some() {
            self.reconcile_with_retry().await;
        }
    }

    async fn block_attach(&mut self, notification: &BlockNotification) {
        self.handle_attach(notification).await;
    }

    async fn block_detach(&mut self, notification: &BlockNotification) {
        self.handle_detach(notification).await;
    }
}
