//! Wire format encoding and decoding.
//!
//! Implements the 8-byte frame header:
//! ```text
//! ┌──────────────┬──────────────┬──────────────┐
//! │ Component ID │ Message Type │ Payload Size │
//! │ 2 bytes      │ 2 bytes      │ 4 bytes      │
//! │ uint16 BE    │ uint16 BE    │ uint32 BE    │
//! └──────────────┴──────────────┴──────────────┘
//! ```
//!
//! All multi-byte integers are Big Endian. The stream is a strict
//! concatenation of `[header][payload]` frames.

use crate::error::{FramelinkError, Result};

/// Header size in bytes (fixed, exactly 8).
pub const HEADER_SIZE: usize = 8;

/// Default maximum payload size accepted from a peer (64 MiB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: u32 = 64 * 1024 * 1024;

/// Decoded header from wire format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHeader {
    /// Logical subsystem the message belongs to.
    pub component_id: u16,
    /// Payload schema within the component.
    pub message_type: u16,
    /// Number of payload bytes following the header.
    pub payload_size: u32,
}

impl FrameHeader {
    /// Create a new header.
    pub fn new(component_id: u16, message_type: u16, payload_size: u32) -> Self {
        Self {
            component_id,
            message_type,
            payload_size,
        }
    }

    /// Encode header to bytes (Big Endian).
    ///
    /// # Example
    ///
    /// ```
    /// use framelink::protocol::FrameHeader;
    ///
    /// let bytes = FrameHeader::new(1, 10, 4).encode();
    /// assert_eq!(bytes, [0, 1, 0, 10, 0, 0, 0, 4]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[0..2].copy_from_slice(&self.component_id.to_be_bytes());
        buf[2..4].copy_from_slice(&self.message_type.to_be_bytes());
        buf[4..8].copy_from_slice(&self.payload_size.to_be_bytes());
    }

    /// Decode a header from exactly `HEADER_SIZE` bytes.
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            component_id: u16::from_be_bytes([buf[0], buf[1]]),
            message_type: u16::from_be_bytes([buf[2], buf[3]]),
            payload_size: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }

    /// Decode header from bytes (Big Endian).
    ///
    /// Returns `None` if buffer is too short. Trailing bytes are ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use framelink::protocol::FrameHeader;
    ///
    /// let header = FrameHeader::decode(&[0, 2, 0, 20, 0, 0, 0, 0]).unwrap();
    /// assert_eq!(header.component_id, 2);
    /// assert_eq!(header.message_type, 20);
    /// assert_eq!(header.payload_size, 0);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        let fixed: &[u8; HEADER_SIZE] = buf.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self::from_bytes(fixed))
    }

    /// Check the payload size against a ceiling.
    pub fn validate(&self, max_payload_size: u32) -> Result<()> {
        if self.payload_size > max_payload_size {
            return Err(FramelinkError::PayloadTooLarge {
                size: u64::from(self.payload_size),
                max: max_payload_size,
            });
        }
        Ok(())
    }

    /// Payload size as a `usize`.
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload_size as usize
    }
}

/// Encode a header to bytes (standalone function).
#[inline]
pub fn encode_header(component_id: u16, message_type: u16, payload_size: u32) -> [u8; HEADER_SIZE] {
    FrameHeader::new(component_id, message_type, payload_size).encode()
}

/// Decode a header from bytes (standalone function).
#[inline]
pub fn decode_header(buf: &[u8]) -> Option<FrameHeader> {
    FrameHeader::decode(buf)
}

/// Convert a payload length to the header's `payload_size`, enforcing a
/// ceiling.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if `len` exceeds `max_payload_size`.
pub fn checked_payload_size(len: usize, max_payload_size: u32) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|size| *size <= max_payload_size)
        .ok_or(FramelinkError::PayloadTooLarge {
            size: len as u64,
            max: max_payload_size,
        })
}

/// Build a complete frame as a single byte vector.
///
/// The header's `payload_size` is taken from `payload.len()`.
///
/// # Errors
///
/// Returns `PayloadTooLarge` if the payload is longer than `u32::MAX` bytes.
pub fn build_frame(component_id: u16, message_type: u16, payload: &[u8]) -> Result<Vec<u8>> {
    let size = checked_payload_size(payload.len(), u32::MAX)?;
    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&encode_header(component_id, message_type, size));
    buf.extend_from_slice(payload);
    Ok(buf)
}
