//! Pass-through registry for applications that do their own encoding.

use bytes::Bytes;

use super::MessageRegistry;
use crate::codec::RawCodec;
use crate::error::Result;
use crate::protocol::FrameHeader;

/// Registry whose messages are the raw payload bytes.
///
/// Every (component id, message type) pair is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawRegistry;

impl RawRegistry {
    /// Create a new raw registry.
    pub fn new() -> Self {
        Self
    }
}

impl MessageRegistry for RawRegistry {
    type Message = Bytes;

    fn serialize(&self, _component_id: u16, _message_type: u16, message: &Bytes) -> Result<Bytes> {
        Ok(RawCodec::serialize_bytes(message.clone()))
    }

    fn deserialize(&self, _header: &FrameHeader, payload: &[u8]) -> Result<Bytes> {
        Ok(RawCodec::deserialize(payload))
    }
}
