//! Multi-part pub/sub transport seam.

use async_trait::async_trait;

/// One message: a list of frames.
pub type Multipart = Vec<Vec<u8>>;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("transport closed")]
    Closed,

    #[error("transport lock was poisoned")]
    LockPoisoned,
}

/// Opens subscriber sockets.
pub trait TransportConnector: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Box<dyn NotificationSocket>, TransportError>;
}

/// A connected subscriber socket.
///
/// Subscriptions are prefix filters on the first frame. A socket without any
/// subscription receives nothing.
#[async_trait]
pub trait NotificationSocket: Send {
    fn subscribe(&mut self, prefix: &str);

    /// Wait for the next message matching a subscription.
    ///
    /// Must be cancel safe: dropping the future before it completes loses no
    /// message.
    async fn recv_multipart(&mut self) -> Result<Multipart, TransportError>;
}
