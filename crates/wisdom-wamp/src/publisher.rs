//! Outbound message delivery.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

/// Sends serialized WAMP messages to connected clients.
///
/// The host's WebSocket layer implements this. Calls must not block for
/// long: the controller invokes `send` inline while dispatching.
pub trait Publisher: Send + Sync {
    /// Deliver one text frame to `client_id` on `channel`.
    fn send(&self, channel: &str, client_id: &str, message: String);
}

impl<P: Publisher + ?Sized> Publisher for Arc<P> {
    fn send(&self, channel: &str, client_id: &str, message: String) {
        (**self).send(channel, client_id, message);
    }
}

/// A message routed through [`ChannelPublisher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Route the message was sent on
    pub channel: String,
    /// Serialized WAMP message
    pub message: String,
}

/// [`Publisher`] backed by one unbounded tokio channel per client.
///
/// The transport calls [`connect`](Self::connect) when a socket opens and
/// forwards whatever arrives on the returned receiver.
#[derive(Debug, Default)]
pub struct ChannelPublisher {
    clients: DashMap<String, mpsc::UnboundedSender<Frame>>,
}

impl ChannelPublisher {
    /// Create a publisher with no connected client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a client, replacing any previous receiver for the same id.
    pub fn connect(&self, client_id: impl Into<String>) -> mpsc::UnboundedReceiver<Frame> {
        let (tx, rx) = mpsc::unbounded_channel();
        let client_id = client_id.into();
        tracing::debug!(client_id = %client_id, "Channel attached");
        self.clients.insert(client_id, tx);
        rx
    }

    /// Detach a client. Returns whether it was attached.
    pub fn disconnect(&self, client_id: &str) -> bool {
        let removed = self.clients.remove(client_id).is_some();
        if removed {
            tracing::debug!(client_id, "Channel detached");
        }
        removed
    }

    /// Whether a receiver is attached for `client_id`.
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.contains_key(client_id)
    }

    /// Number of attached clients
    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }
}

impl Publisher for ChannelPublisher {
    fn send(&self, channel: &str, client_id: &str, message: String) {
        let frame = Frame {
            channel: channel.to_string(),
            message,
        };
        let closed = match self.clients.get(client_id) {
            Some(tx) => tx.send(frame).is_err(),
            None => {
                tracing::trace!(client_id, "No channel attached, message discarded");
                return;
            }
        };
        // The guard from `get` is released above; removing while holding it
        // would deadlock the shard. A sender attached in between stays.
        if closed
            && self
                .clients
                .remove_if(client_id, |_, tx| tx.is_closed())
                .is_some()
        {
            tracing::debug!(client_id, "Receiver dropped, detaching channel");
        }
    }
}
