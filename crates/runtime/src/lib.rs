//! Block-event subscription and chain synchronization for off-chain games.
//!
//! The crate keeps game state machines consistent with a blockchain's
//! canonical chain. Block attach/detach notifications arrive through a
//! [`BlockSubscriber`], are sequence-checked and handed to one [`GameSync`]
//! per game, which applies or undoes blocks through the game's [`GameLogic`]
//! and commits the result to a [`GameStorage`]. When notifications and the
//! local tip disagree, the controller reconciles against a [`ChainSource`].
//!
//! Modules are organized by responsibility:
//! - [`subscriber`] receives and dispatches notifications
//! - [`sync`] hosts the per-game state machine
//! - [`logic`] defines the game logic capability and the buffered adapter
//! - [`chain`] and [`repository`] provide the chain and storage adapters
//! - [`daemon`] and [`config`] wire everything into a runnable daemon
pub mod chain;
pub mod config;
pub mod daemon;
pub mod logic;
pub mod repository;
pub mod subscriber;
pub mod sync;

pub use chain::{ChainError, ChainInfo, ChainSource, SimulatedChain, block_header};
pub use config::DaemonConfig;
pub use daemon::{DaemonError, SyncDaemon, SyncDaemonBuilder};
pub use logic::{
    BufferedCallee, BufferedGameLogic, CallStatus, ForwardOutput, GameLogic, GameLogicError,
    GameNames, InitialState,
};
pub use repository::{
    FileGameStorage, GameStorage, InMemoryGameStorage, RepositoryError, StateCommit, StoredState,
    UndoRecord,
};
pub use subscriber::{
    BlockListener, BlockNotification, BlockSubscriber, MemoryTransport, NotificationPublisher,
    SequenceTracker, SubscriberConfig, SubscriberError, TransportConnector, TransportError,
};
pub use sync::{GameSync, RetryPolicy, SyncConfig, SyncError, SyncState, SyncStatus};
