//! Handler interface for decoded block notifications.

use async_trait::async_trait;
use serde_json::Value;

use gamesync_types::BlockEventKind;

/// A validated, decoded notification.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockNotification {
    pub game_id: String,
    pub kind: BlockEventKind,
    pub payload: Value,
    pub seq: u32,
    /// Set when `seq` is not contiguous with the previous notification on
    /// the same `(game_id, kind)` channel.
    pub seq_mismatch: bool,
}

/// Receives notifications for one game.
///
/// Calls are made one at a time from the subscriber worker in receipt order.
/// Implementations may block the worker for as long as processing takes;
/// nothing else is dispatched meanwhile.
#[async_trait]
pub trait BlockListener: Send {
    /// Called on the worker once the socket is subscribed, before the first
    /// notification is dispatched. Notifications published from here on are
    /// queued, so anything the listener learns from other sources now cannot
    /// miss a later block.
    async fn started(&mut self) {}

    async fn block_attach(&mut self, notification: &BlockNotification);

    async fn block_detach(&mut self, notification: &BlockNotification);
}
