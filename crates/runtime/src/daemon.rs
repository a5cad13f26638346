//! Daemon orchestrator.
//!
//! Wires the subscriber, one sync controller per game, storage and the
//! chain source together behind a builder.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::chain::ChainSource;
use crate::config::DaemonConfig;
use crate::logic::{GameLogic, GameLogicError, GameNames};
use crate::repository::{FileGameStorage, GameStorage, InMemoryGameStorage, RepositoryError};
use crate::subscriber::{BlockSubscriber, SubscriberError, TransportConnector};
use crate::sync::{GameSync, SyncError, SyncStatus};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("no games registered")]
    NoGames,

    #[error("chain source not set")]
    MissingChainSource,

    #[error("transport not set")]
    MissingTransport,

    #[error("game {0} is registered twice")]
    DuplicateGame(String),

    #[error("failed to query game names: {0}")]
    Names(#[from] GameLogicError),

    #[error("failed to open storage for game {game_id}: {source}")]
    Storage {
        game_id: String,
        #[source]
        source: RepositoryError,
    },

    #[error("failed to initialize game {game_id}: {source}")]
    Initialize {
        game_id: String,
        #[source]
        source: SyncError,
    },

    #[error(transparent)]
    Subscriber(#[from] SubscriberError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// A running daemon.
///
/// All games are synced to the canonical tip before the subscriber starts.
/// Game state changes afterwards are visible through [`SyncDaemon::status`]
/// and [`SyncDaemon::watch`].
pub struct SyncDaemon {
    subscriber: BlockSubscriber,
    games: Vec<GameNames>,
    statuses: BTreeMap<String, watch::Receiver<SyncStatus>>,
}

impl SyncDaemon {
    pub fn builder() -> SyncDaemonBuilder {
        SyncDaemonBuilder::new()
    }

    /// Names of the registered games, in registration order.
    pub fn games(&self) -> &[GameNames] {
        &self.games
    }

    pub fn status(&self, game_id: &str) -> Option<SyncStatus> {
        self.statuses.get(game_id).map(|rx| *rx.borrow())
    }

    pub fn watch(&self, game_id: &str) -> Option<watch::Receiver<SyncStatus>> {
        self.statuses.get(game_id).cloned()
    }

    /// Wait until the status of `game_id` satisfies `predicate`.
    ///
    /// Returns `None` for unknown games or when the controller is gone.
    pub async fn wait_for(
        &self,
        game_id: &str,
        predicate: impl FnMut(&SyncStatus) -> bool,
    ) -> Option<SyncStatus> {
        let mut rx = self.watch(game_id)?;
        let status = rx.wait_for(predicate).await.ok()?;
        Some(*status)
    }

    /// Whether notifications are still being received. False once the
    /// transport has failed, even before [`SyncDaemon::shutdown`].
    pub fn is_running(&self) -> bool {
        self.subscriber.is_running()
    }

    /// Stop receiving notifications and wait for the worker to finish.
    pub async fn shutdown(mut self) {
        info!("Shutting down sync daemon");
        if self.subscriber.is_started() {
            self.subscriber.stop().await;
        }
    }
}

/// Builder for [`SyncDaemon`].
pub struct SyncDaemonBuilder {
    config: DaemonConfig,
    connector: Option<Arc<dyn TransportConnector>>,
    chain: Option<Arc<dyn ChainSource>>,
    games: Vec<(Box<dyn GameLogic>, Option<Arc<dyn GameStorage>>)>,
}

impl SyncDaemonBuilder {
    fn new() -> Self {
        Self {
            config: DaemonConfig::default(),
            connector: None,
            chain: None,
            games: Vec::new(),
        }
    }

    /// Override daemon configuration
    pub fn config(mut self, config: DaemonConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the notification transport (required)
    pub fn transport(mut self, connector: Arc<dyn TransportConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Set the chain source (required)
    pub fn chain(mut self, chain: Arc<dyn ChainSource>) -> Self {
        self.chain = Some(chain);
        self
    }

    /// Register a game. Its state goes to `data_dir/<game id>` when a data
    /// directory is configured and stays in memory otherwise.
    pub fn game(mut self, logic: impl GameLogic + 'static) -> Self {
        self.games.push((Box::new(logic), None));
        self
    }

    /// Register a game with explicit storage.
    pub fn game_with_storage(
        mut self,
        logic: impl GameLogic + 'static,
        storage: Arc<dyn GameStorage>,
    ) -> Self {
        self.games.push((Box::new(logic), Some(storage)));
        self
    }

    fn open_storage(&self, game_id: &str) -> Result<Arc<dyn GameStorage>> {
        match self.config.game_dir(game_id) {
            Some(dir) => {
                let storage =
                    FileGameStorage::new(&dir).map_err(|source| DaemonError::Storage {
                        game_id: game_id.to_string(),
                        source,
                    })?;
                info!("Game {} stores state in {}", game_id, dir.display());
                Ok(Arc::new(storage))
            }
            None => Ok(Arc::new(InMemoryGameStorage::new())),
        }
    }

    /// Initialize every game, then start the subscriber.
    pub async fn build(mut self) -> Result<SyncDaemon> {
        let connector = self
            .connector
            .take()
            .ok_or(DaemonError::MissingTransport)?;
        let chain = self.chain.take().ok_or(DaemonError::MissingChainSource)?;
        if self.games.is_empty() {
            return Err(DaemonError::NoGames);
        }

        let mut subscriber = BlockSubscriber::new(connector, self.config.subscriber_config());
        let mut games = Vec::new();
        let mut statuses = BTreeMap::new();

        for (mut logic, storage) in std::mem::take(&mut self.games) {
            let names = logic.names()?;
            info!(
                "Game {} ({}) version {}",
                names.id, names.name, names.version
            );
            if statuses.contains_key(&names.id) {
                return Err(DaemonError::DuplicateGame(names.id));
            }

            let storage = match storage {
                Some(storage) => storage,
                None => self.open_storage(&names.id)?,
            };

            let mut sync = GameSync::new(
                names.id.clone(),
                logic,
                storage,
                Arc::clone(&chain),
                self.config.sync_config(),
            );
            let status = sync
                .initialize()
                .await
                .map_err(|source| DaemonError::Initialize {
                    game_id: names.id.clone(),
                    source,
                })?;
            info!(game_id = %names.id, state = %status.state, "Game initialized");

            statuses.insert(names.id.clone(), sync.subscribe());
            subscriber.add_listener(names.id.clone(), Box::new(sync));
            games.push(names);
        }

        subscriber.set_endpoint(self.config.endpoint.clone());
        subscriber.start()?;

        Ok(SyncDaemon {
            subscriber,
            games,
            statuses,
        })
    }
}
