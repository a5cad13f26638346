//! Background receive loop of the block subscriber.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, error, trace};

use gamesync_types::BlockEventKind;

use super::listener::{BlockListener, BlockNotification};
use super::sequence::SequenceTracker;
use super::topic::parse_topic;
use super::transport::{Multipart, NotificationSocket};

/// Frames of one message after shape validation.
#[derive(Debug)]
pub(crate) struct Frames {
    pub topic: Vec<u8>,
    pub payload: Vec<u8>,
    pub seq: u32,
}

/// Check the `[topic, payload, seq]` shape of a message.
///
/// # Panics
///
/// If the message does not have three frames or the sequence frame is not
/// four bytes. The publisher is broken at that point.
pub(crate) fn split_frames(parts: Multipart) -> Frames {
    let count = parts.len();
    let Ok([topic, payload, seq]) = <[Vec<u8>; 3]>::try_from(parts) else {
        panic!("expected exactly three message parts, got {}", count);
    };

    let seq: [u8; 4] = seq.as_slice().try_into().unwrap_or_else(|_| {
        panic!(
            "sequence number should have size 4, got {} bytes",
            seq.len()
        )
    });

    Frames {
        topic,
        payload,
        seq: u32::from_le_bytes(seq),
    }
}

/// State owned by the worker task while the subscriber runs. Handed back to
/// the subscriber when the task ends.
pub(crate) struct Worker {
    pub socket: Box<dyn NotificationSocket>,
    pub listeners: HashMap<String, Vec<Box<dyn BlockListener>>>,
    pub tracker: SequenceTracker,
    pub suppress_dispatch: bool,
}

impl Worker {
    pub async fn run(mut self, mut stop_rx: oneshot::Receiver<()>) -> Self {
        debug!(games = self.listeners.len(), "Block subscriber worker started");

        if !self.suppress_dispatch {
            for handler in self.listeners.values_mut().flatten() {
                handler.started().await;
            }
        }

        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                received = self.socket.recv_multipart() => match received {
                    Ok(parts) => self.handle_message(parts).await,
                    Err(e) => {
                        error!("Notification socket failed, worker exits: {}", e);
                        break;
                    }
                },
            }
        }

        debug!("Block subscriber worker stopped");
        self
    }

    async fn handle_message(&mut self, parts: Multipart) {
        let frames = split_frames(parts);

        let Some((kind, game_id)) = std::str::from_utf8(&frames.topic)
            .ok()
            .and_then(parse_topic)
            .filter(|(_, game_id)| self.listeners.contains_key(*game_id))
        else {
            trace!(
                topic = %String::from_utf8_lossy(&frames.topic),
                "Ignoring notification on unregistered topic"
            );
            return;
        };

        let payload: Value = serde_json::from_slice(&frames.payload)
            .unwrap_or_else(|e| panic!("error parsing notification payload: {}", e));

        let seq_mismatch = self.tracker.annotate(game_id, kind, frames.seq);
        if seq_mismatch {
            debug!(game_id, %kind, seq = frames.seq, "Sequence number mismatch");
        }

        if self.suppress_dispatch {
            trace!(game_id, %kind, seq = frames.seq, "Dispatch suppressed");
            return;
        }

        let notification = BlockNotification {
            game_id: game_id.to_string(),
            kind,
            payload,
            seq: frames.seq,
            seq_mismatch,
        };

        if let Some(handlers) = self.listeners.get_mut(&notification.game_id) {
            for handler in handlers.iter_mut() {
                match kind {
                    BlockEventKind::Attach => handler.block_attach(&notification).await,
                    BlockEventKind::Detach => handler.block_detach(&notification).await,
                }
            }
        }
    }
}
