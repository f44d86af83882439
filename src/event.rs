//! Event sink - how a session reports back to its owner.
//!
//! All callbacks run on the I/O driver thread, one at a time. They run
//! concurrently with application threads calling `Client::send`, so a sink
//! that shares state with those threads needs its own synchronization.
//! Callbacks should return quickly: a slow callback stalls the receive
//! loop and every pending write.

use std::fmt;
use std::io;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::error::Result;

/// Why a connection ended (or never started).
#[derive(Debug, Error)]
pub enum DisconnectReason {
    /// The application called `disconnect()`.
    #[error("disconnect requested")]
    Requested,

    /// Name resolution failed or returned no addresses.
    #[error("name resolution failed: {0}")]
    Resolve(#[source] io::Error),

    /// Every resolved address refused or failed.
    #[error("connect failed: {0}")]
    Connect(#[source] io::Error),

    /// The peer closed the stream at a frame boundary.
    #[error("connection closed by peer")]
    PeerClosed,

    /// Read or write failure on an established connection.
    #[error("transport error: {0}")]
    Transport(#[source] io::Error),

    /// The peer announced a payload above the configured ceiling.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u64, max: u32 },

    /// The inbound buffer could not grow to fit a payload.
    #[error("could not allocate {requested} bytes for inbound payload")]
    ResourceExhausted { requested: usize },
}

impl DisconnectReason {
    /// Check if the application asked for this disconnect.
    #[inline]
    pub fn is_requested(&self) -> bool {
        matches!(self, Self::Requested)
    }
}

/// A single disconnect notification.
#[derive(Debug)]
pub struct Disconnect {
    /// Why the connection ended.
    pub reason: DisconnectReason,
    /// Queued frames dropped without being written.
    pub undelivered: usize,
}

impl fmt::Display for Disconnect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.undelivered == 0 {
            write!(f, "{}", self.reason)
        } else {
            write!(f, "{} ({} frames undelivered)", self.reason, self.undelivered)
        }
    }
}

/// Receiver of session events.
pub trait EventSink<M>: Send + Sync + 'static {
    /// The connection is established and the receive loop is running.
    fn on_connected(&self);

    /// The connection (or connection attempt) ended.
    ///
    /// Fires exactly once per `async_connect`, whether or not the
    /// connection was ever established.
    fn on_disconnected(&self, disconnect: Disconnect);

    /// A frame arrived. `Err` means the registry could not decode it; the
    /// receive loop continues with the next frame either way.
    fn on_message(&self, component_id: u16, message_type: u16, message: Result<M>);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl<M: Send + 'static> EventSink<M> for NullSink {
    fn on_connected(&self) {}

    fn on_disconnected(&self, disconnect: Disconnect) {
        tracing::debug!("disconnected: {}", disconnect);
    }

    fn on_message(&self, component_id: u16, message_type: u16, _message: Result<M>) {
        tracing::trace!(component_id, message_type, "dropping message (no sink)");
    }
}

/// Session event as delivered by [`ChannelSink`].
#[derive(Debug)]
pub enum ClientEvent<M> {
    /// See [`EventSink::on_connected`].
    Connected,
    /// See [`EventSink::on_disconnected`].
    Disconnected(Disconnect),
    /// See [`EventSink::on_message`].
    Message {
        component_id: u16,
        message_type: u16,
        message: Result<M>,
    },
}

/// Sink that forwards every event into an unbounded channel.
///
/// # Example
///
/// ```
/// use bytes::Bytes;
/// use framelink::event::{ChannelSink, ClientEvent, EventSink};
///
/// let (sink, mut rx) = ChannelSink::<Bytes>::new();
/// sink.on_connected();
/// assert!(matches!(rx.try_recv(), Ok(ClientEvent::Connected)));
/// ```
#[derive(Debug)]
pub struct ChannelSink<M> {
    tx: mpsc::UnboundedSender<ClientEvent<M>>,
}

impl<M> ChannelSink<M> {
    /// Create a sink and the receiver that observes it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent<M>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: ClientEvent<M>) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped");
        }
    }
}

impl<M: Send + 'static> EventSink<M> for ChannelSink<M> {
    fn on_connected(&self) {
        self.forward(ClientEvent::Connected);
    }

    fn on_disconnected(&self, disconnect: Disconnect) {
        self.forward(ClientEvent::Disconnected(disconnect));
    }

    fn on_message(&self, component_id: u16, message_type: u16, message: Result<M>) {
        self.forward(ClientEvent::Message {
            component_id,
            message_type,
            message,
        });
    }
}
