//! Message registry - maps (component id, message type) to payload codecs.
//!
//! The session never looks inside payloads. It hands outgoing messages to a
//! [`MessageRegistry`] to get payload bytes, and hands each received
//! `(header, payload)` pair back to it to get a typed message.
//!
//! Two registries ship with the crate:
//! - [`RawRegistry`] - messages are plain [`Bytes`](bytes::Bytes)
//! - [`TypedRegistry`] - Rust types registered per (component, type) and
//!   encoded with MessagePack
//!
//! # Example
//!
//! ```
//! use framelink::registry::{AnyMessage, MessageRegistry, TypedRegistry};
//! use framelink::protocol::FrameHeader;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Heartbeat { seq: u32 }
//!
//! let mut registry = TypedRegistry::new();
//! registry.register::<Heartbeat>(1, 10);
//!
//! let payload = registry.serialize(1, 10, &AnyMessage::new(Heartbeat { seq: 3 })).unwrap();
//! let header = FrameHeader::new(1, 10, payload.len() as u32);
//! let message = registry.deserialize(&header, &payload).unwrap();
//! assert_eq!(message.downcast_ref::<Heartbeat>(), Some(&Heartbeat { seq: 3 }));
//! ```

mod raw;
mod typed;

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::FrameHeader;

pub use raw::RawRegistry;
pub use typed::{AnyMessage, TypedRegistry};

/// Encodes outgoing messages and decodes incoming payloads.
///
/// Implementations are shared between application threads (`serialize`,
/// called from `Client::send`) and the I/O thread (`deserialize`), so they
/// must be `Send + Sync`.
pub trait MessageRegistry: Send + Sync + 'static {
    /// Message type produced by `deserialize` and accepted by `serialize`.
    type Message: Send + 'static;

    /// Encode a message into payload bytes.
    ///
    /// Errors propagate synchronously out of `Client::send`.
    fn serialize(
        &self,
        component_id: u16,
        message_type: u16,
        message: &Self::Message,
    ) -> Result<Bytes>;

    /// Decode a received payload.
    ///
    /// Errors are delivered to the event sink; the receive loop continues.
    fn deserialize(&self, header: &FrameHeader, payload: &[u8]) -> Result<Self::Message>;
}
