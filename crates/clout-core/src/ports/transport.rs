//! Transport port (§6): a bidirectional message channel per peer.

use tokio::sync::mpsc;

pub trait TransportPort: Send + Sync {
    fn send(&self, bytes: Vec<u8>) -> Result<(), crate::CoreError>;
}

/// An in-process channel pair, useful for wiring two nodes together in
/// tests without a real socket.
pub struct InMemoryTransport {
    outbox: mpsc::UnboundedSender<Vec<u8>>,
}

impl InMemoryTransport {
    /// Returns the sending half (a `TransportPort`) and the receiving
    /// half the test harness drains to see what was "sent over the wire".
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { outbox: tx }, rx)
    }
}

impl TransportPort for InMemoryTransport {
    fn send(&self, bytes: Vec<u8>) -> Result<(), crate::CoreError> {
        self.outbox.send(bytes).map_err(|_| crate::CoreError::Unavailable("peer channel closed".into()))
    }
}
