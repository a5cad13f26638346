//! Block notification subscriber.
//!
//! [`BlockSubscriber`] connects to a notification endpoint, subscribes the
//! attach and detach topics of every registered game, and runs one worker
//! task that validates incoming messages and hands them to the game's
//! [`BlockListener`]s in receipt order.
//!
//! Configuration can only change while the subscriber is stopped. Calling a
//! configuration method on a running subscriber, or starting/stopping it in
//! the wrong state, is a programming error and panics.

mod listener;
mod memory;
mod sequence;
mod topic;
mod transport;
mod worker;

use std::collections::HashMap;
use std::panic;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use gamesync_types::BlockEventKind;

pub use listener::{BlockListener, BlockNotification};
pub use memory::{MemoryTransport, NotificationPublisher};
pub use sequence::SequenceTracker;
pub use topic::{parse_topic, topic};
pub use transport::{Multipart, NotificationSocket, TransportConnector, TransportError};

use worker::Worker;

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Subscriber options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Receive, validate and sequence-track messages without calling any
    /// listener.
    pub suppress_dispatch: bool,
}

struct RunningWorker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<Worker>,
}

/// Receives block notifications and dispatches them per game.
pub struct BlockSubscriber {
    connector: Arc<dyn TransportConnector>,
    config: SubscriberConfig,
    endpoint: Option<String>,
    listeners: HashMap<String, Vec<Box<dyn BlockListener>>>,
    tracker: SequenceTracker,
    worker: Option<RunningWorker>,
}

impl BlockSubscriber {
    pub fn new(connector: Arc<dyn TransportConnector>, config: SubscriberConfig) -> Self {
        Self {
            connector,
            config,
            endpoint: None,
            listeners: HashMap::new(),
            tracker: SequenceTracker::new(),
            worker: None,
        }
    }

    pub fn set_endpoint(&mut self, endpoint: impl Into<String>) {
        assert!(
            !self.is_started(),
            "cannot change the endpoint of a running subscriber"
        );
        self.endpoint = Some(endpoint.into());
    }

    pub fn is_endpoint_set(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Register a listener for `game_id`. Several listeners for one game are
    /// called in registration order.
    pub fn add_listener(&mut self, game_id: impl Into<String>, listener: Box<dyn BlockListener>) {
        assert!(
            !self.is_started(),
            "cannot add listeners to a running subscriber"
        );
        self.listeners
            .entry(game_id.into())
            .or_default()
            .push(listener);
    }

    /// Whether the worker is receiving notifications. Turns false on its own
    /// when the transport fails; [`BlockSubscriber::stop`] must still be
    /// called before the subscriber can be reconfigured.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Whether [`BlockSubscriber::start`] was called without a matching stop.
    pub fn is_started(&self) -> bool {
        self.worker.is_some()
    }

    /// Connect, subscribe all registered games and spawn the worker.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), SubscriberError> {
        assert!(!self.is_started(), "subscriber is already running");
        let Some(endpoint) = self.endpoint.as_deref() else {
            panic!("subscriber endpoint must be set before starting");
        };

        let mut socket = self.connector.connect(endpoint)?;
        for game_id in self.listeners.keys() {
            for kind in [BlockEventKind::Attach, BlockEventKind::Detach] {
                socket.subscribe(&topic(kind, game_id));
            }
        }

        info!(
            endpoint,
            games = self.listeners.len(),
            suppress_dispatch = self.config.suppress_dispatch,
            "Starting block subscriber"
        );

        let worker = Worker {
            socket,
            listeners: std::mem::take(&mut self.listeners),
            tracker: std::mem::take(&mut self.tracker),
            suppress_dispatch: self.config.suppress_dispatch,
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(stop_rx));
        self.worker = Some(RunningWorker { stop_tx, handle });

        Ok(())
    }

    /// Stop the worker and wait for it to finish.
    ///
    /// A listener call in progress runs to completion first. Listeners and
    /// sequence state are kept, so the subscriber can be restarted. A panic
    /// on the worker is re-raised here.
    pub async fn stop(&mut self) {
        let Some(RunningWorker { stop_tx, handle }) = self.worker.take() else {
            panic!("subscriber is not running");
        };

        // The worker may already have exited on a transport error.
        let _ = stop_tx.send(());

        match handle.await {
            Ok(worker) => {
                self.listeners = worker.listeners;
                self.tracker = worker.tracker;
                info!("Block subscriber stopped");
            }
            Err(e) if e.is_panic() => panic::resume_unwind(e.into_panic()),
            Err(e) => warn!("Block subscriber worker was cancelled: {}", e),
        }
    }

    /// Last sequence number seen on a channel as of the last stop.
    pub fn last_sequence(&self, game_id: &str, kind: BlockEventKind) -> Option<u32> {
        self.tracker.last(game_id, kind)
    }
}

impl Drop for BlockSubscriber {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
        }
    }
}
