//! In-process pub/sub transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use gamesync_types::BlockEventKind;

use super::topic::topic;
use super::transport::{Multipart, NotificationSocket, TransportConnector, TransportError};

type Endpoints = HashMap<String, Vec<mpsc::UnboundedSender<Multipart>>>;

/// Pub/sub bus keyed by endpoint string.
///
/// Clones share the same bus. Every message published on an endpoint is
/// delivered to each socket connected to it at that moment; sockets then
/// filter by their subscriptions.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    endpoints: Arc<Mutex<Endpoints>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver `parts` to all live sockets on `endpoint`, returning how many
    /// received it. Sockets that were dropped are forgotten.
    pub fn publish(&self, endpoint: &str, parts: Multipart) -> Result<usize, TransportError> {
        let mut endpoints = self
            .endpoints
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?;

        let Some(senders) = endpoints.get_mut(endpoint) else {
            return Ok(0);
        };

        senders.retain(|tx| tx.send(parts.clone()).is_ok());
        Ok(senders.len())
    }

    /// Publisher that numbers notifications per topic.
    pub fn publisher(&self, endpoint: impl Into<String>) -> NotificationPublisher {
        NotificationPublisher {
            transport: self.clone(),
            endpoint: endpoint.into(),
            next_seq: Mutex::new(HashMap::new()),
        }
    }
}

impl TransportConnector for MemoryTransport {
    fn connect(&self, endpoint: &str) -> Result<Box<dyn NotificationSocket>, TransportError> {
        if endpoint.is_empty() {
            return Err(TransportError::Connect {
                endpoint: endpoint.to_string(),
                reason: "empty endpoint".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.endpoints
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?
            .entry(endpoint.to_string())
            .or_default()
            .push(tx);

        tracing::debug!(endpoint, "Connected in-memory notification socket");
        Ok(Box::new(MemorySocket {
            rx,
            subscriptions: Vec::new(),
        }))
    }
}

struct MemorySocket {
    rx: mpsc::UnboundedReceiver<Multipart>,
    subscriptions: Vec<Vec<u8>>,
}

impl MemorySocket {
    fn matches(&self, parts: &Multipart) -> bool {
        parts.first().is_some_and(|first| {
            self.subscriptions
                .iter()
                .any(|prefix| first.starts_with(prefix))
        })
    }
}

#[async_trait]
impl NotificationSocket for MemorySocket {
    fn subscribe(&mut self, prefix: &str) {
        self.subscriptions.push(prefix.as_bytes().to_vec());
    }

    async fn recv_multipart(&mut self) -> Result<Multipart, TransportError> {
        loop {
            let parts = self.rx.recv().await.ok_or(TransportError::Closed)?;
            if self.matches(&parts) {
                return Ok(parts);
            }
        }
    }
}

/// Publishes block notifications in wire format.
///
/// Each topic has its own sequence counter starting at zero, the way a
/// chain node numbers its notification streams.
pub struct NotificationPublisher {
    transport: MemoryTransport,
    endpoint: String,
    next_seq: Mutex<HashMap<String, u32>>,
}

impl NotificationPublisher {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Publish with the topic's next sequence number and return that number.
    pub fn publish(
        &self,
        kind: BlockEventKind,
        game_id: &str,
        payload: &Value,
    ) -> Result<u32, TransportError> {
        let seq = self.take_seq(kind, game_id, 1)?;
        self.publish_with_seq(kind, game_id, payload, seq)?;
        Ok(seq)
    }

    /// Publish with an explicit sequence number. The topic counter is left
    /// untouched.
    pub fn publish_with_seq(
        &self,
        kind: BlockEventKind,
        game_id: &str,
        payload: &Value,
        seq: u32,
    ) -> Result<usize, TransportError> {
        let parts = vec![
            topic(kind, game_id).into_bytes(),
            payload.to_string().into_bytes(),
            seq.to_le_bytes().to_vec(),
        ];
        self.publish_raw(parts)
    }

    /// Advance the topic counter as if `count` notifications had been sent
    /// and lost.
    pub fn skip(
        &self,
        kind: BlockEventKind,
        game_id: &str,
        count: u32,
    ) -> Result<(), TransportError> {
        self.take_seq(kind, game_id, count).map(|_| ())
    }

    /// Publish arbitrary frames on the endpoint.
    pub fn publish_raw(&self, parts: Multipart) -> Result<usize, TransportError> {
        self.transport.publish(&self.endpoint, parts)
    }

    fn take_seq(
        &self,
        kind: BlockEventKind,
        game_id: &str,
        count: u32,
    ) -> Result<u32, TransportError> {
        let mut next_seq = self
            .next_seq
            .lock()
            .map_err(|_| TransportError::LockPoisoned)?;
        let next = next_seq.entry(topic(kind, game_id)).or_insert(0);
        let seq = *next;
        *next = next.wrapping_add(count);
        Ok(seq)
    }
}
