//! Reusable payload buffer for the receive loop.
//!
//! The receive loop reads each header into a fixed scratch area and each
//! payload into this buffer. The buffer grows to fit the largest payload
//! seen so far and never shrinks, so steady-state traffic does not
//! allocate.
//!
//! Growth goes through [`Vec::try_reserve_exact`]; an allocation failure
//! surfaces as [`FramelinkError::ResourceExhausted`](crate::FramelinkError)
//! rather than aborting the process. Payload sizes are checked against a
//! ceiling before any growth is attempted.

use super::wire_format::{FrameHeader, DEFAULT_MAX_PAYLOAD_SIZE};
use crate::error::{FramelinkError, Result};

/// Default initial buffer size (1 KiB).
pub const DEFAULT_INBOUND_CAPACITY: usize = 1024;

/// Growable, never-shrinking payload buffer.
#[derive(Debug)]
pub struct InboundBuffer {
    /// Backing storage; `data.len()` is the usable capacity.
    data: Vec<u8>,
    /// Maximum allowed payload size.
    max_payload_size: u32,
}

impl InboundBuffer {
    /// Create a buffer with default capacity and ceiling.
    pub fn new() -> Self {
        Self::with_capacity_and_max_payload(DEFAULT_INBOUND_CAPACITY, DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a buffer with custom capacity and ceiling.
    pub fn with_capacity_and_max_payload(capacity: usize, max_payload_size: u32) -> Self {
        Self {
            data: vec![0u8; capacity],
            max_payload_size,
        }
    }

    /// Current usable capacity in bytes.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Configured payload ceiling.
    #[inline]
    pub fn max_payload_size(&self) -> u32 {
        self.max_payload_size
    }

    /// Make room for the payload described by `header` and return the
    /// slice it should be read into.
    ///
    /// # Errors
    ///
    /// - `PayloadTooLarge` if the header exceeds the ceiling.
    /// - `ResourceExhausted` if growing the buffer fails.
    pub fn prepare(&mut self, header: &FrameHeader) -> Result<&mut [u8]> {
        header.validate(self.max_payload_size)?;
        let len = header.payload_len();
        self.grow_to(len)?;
        Ok(&mut self.data[..len])
    }

    /// The first `len` bytes of the buffer.
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the current capacity.
    #[inline]
    pub fn filled(&self, len: usize) -> &[u8] {
        &self.data[..len]
    }

    fn grow_to(&mut self, len: usize) -> Result<()> {
        if len <= self.data.len() {
            return Ok(());
        }

        let additional = len - self.data.len();
        self.data
            .try_reserve_exact(additional)
            .map_err(|_| FramelinkError::ResourceExhausted { requested: len })?;
        self.data.resize(len, 0);

        tracing::trace!(capacity = len, "inbound buffer grown");
        Ok(())
    }
}

impl Default for InboundBuffer {
    fn default() -> Self {
        Self::new()
    }
}
