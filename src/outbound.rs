//! Outbound queue and frame writer.
//!
//! Application threads push encoded frames into an [`OutboundQueue`]; a
//! single drain task on the I/O driver writes them out one at a time.
//!
//! ```text
//! Thread 1 ─┐
//! Thread 2 ─┼─► OutboundQueue (Mutex) ─► drain task ─► TcpStream
//! Thread N ─┘
//! ```
//!
//! The queue's `active` flag records whether a drain task owns the write
//! half. It is only ever changed together with the queue contents, under
//! the same lock, so at most one write is in flight and frames leave in
//! exactly the order they were appended.

use std::collections::VecDeque;
use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{FramelinkError, Result};
use crate::protocol::{checked_payload_size, FrameHeader, HEADER_SIZE};

/// A frame ready to be written to the transport.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded header (8 bytes).
    pub header: [u8; HEADER_SIZE],
    /// Payload bytes (can be empty).
    pub payload: Bytes,
}

impl OutboundFrame {
    /// Create a new outbound frame.
    ///
    /// # Errors
    ///
    /// Returns `PayloadTooLarge` if the payload exceeds `max_payload_size`.
    pub fn new(
        component_id: u16,
        message_type: u16,
        payload: Bytes,
        max_payload_size: u32,
    ) -> Result<Self> {
        let size = checked_payload_size(payload.len(), max_payload_size)?;

        Ok(Self {
            header: FrameHeader::new(component_id, message_type, size).encode(),
            payload,
        })
    }

    /// Decoded view of the header.
    #[inline]
    pub fn frame_header(&self) -> FrameHeader {
        FrameHeader::from_bytes(&self.header)
    }

    /// Total size of this frame (header + payload).
    #[inline]
    pub fn size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// What the queue currently does with submitted frames.
///
/// `L` is the connection frames are written to while open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum QueueMode<L> {
    /// No connection and none pending; submissions fail.
    Closed,
    /// Not yet connected; submissions wait in the queue.
    Buffering,
    /// Connected; submissions are written.
    Open(L),
}

/// Outcome of [`OutboundQueue::submit`].
#[derive(Debug)]
pub(crate) enum Submitted<L> {
    /// The caller now owns the write and must start a drain on `L`.
    Drain(L, OutboundFrame),
    /// The frame was appended behind earlier ones.
    Queued,
}

/// FIFO of frames waiting for the transport.
#[derive(Debug)]
pub(crate) struct OutboundQueue<L> {
    frames: VecDeque<OutboundFrame>,
    active: bool,
    mode: QueueMode<L>,
    /// Maximum waiting frames (0 = unbounded).
    max_queued: usize,
}

impl<L: Clone> OutboundQueue<L> {
    pub(crate) fn new(mode: QueueMode<L>, max_queued: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            active: false,
            mode,
            max_queued,
        }
    }

    /// Hand a frame to the queue.
    pub(crate) fn submit(&mut self, frame: OutboundFrame) -> Result<Submitted<L>> {
        match &self.mode {
            QueueMode::Closed => return Err(FramelinkError::NotConnected),
            QueueMode::Open(link) if !self.active => {
                self.active = true;
                return Ok(Submitted::Drain(link.clone(), frame));
            }
            QueueMode::Open(_) | QueueMode::Buffering => {}
        }

        if self.max_queued > 0 && self.frames.len() >= self.max_queued {
            return Err(FramelinkError::QueueFull(self.max_queued));
        }
        self.frames.push_back(frame);
        Ok(Submitted::Queued)
    }

    /// Called by the drain task after each write: the next frame to write,
    /// or `None` once the queue is empty and the drain must exit.
    pub(crate) fn complete(&mut self) -> Option<OutboundFrame> {
        let next = self.frames.pop_front();
        if next.is_none() {
            self.active = false;
        }
        next
    }

    /// Start buffering if currently closed. Frames already waiting stay.
    pub(crate) fn buffer(&mut self) {
        if matches!(self.mode, QueueMode::Closed) {
            self.mode = QueueMode::Buffering;
        }
    }

    /// Switch to writing on `link`. Returns the first buffered frame if a
    /// drain must be started for it.
    pub(crate) fn open(&mut self, link: L) -> Option<OutboundFrame> {
        self.mode = QueueMode::Open(link);
        if self.active {
            return None;
        }
        let first = self.frames.pop_front();
        self.active = first.is_some();
        first
    }

    /// Switch to `mode` and drop everything waiting.
    ///
    /// Returns the number of frames dropped.
    pub(crate) fn reset(&mut self, mode: QueueMode<L>) -> usize {
        let dropped = self.frames.len();
        self.frames.clear();
        self.active = false;
        self.mode = mode;
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.frames.len()
    }

    #[cfg(test)]
    pub(crate) fn is_active(&self) -> bool {
        self.active
    }
}

/// Write one frame with scatter/gather I/O and flush.
///
/// Header and payload go out in a single `write_vectored` call when the
/// kernel accepts them; partial writes are continued until the frame is
/// complete.
pub async fn write_frame<W>(writer: &mut W, frame: &OutboundFrame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size = frame.size();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = remaining_slices(frame, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

/// Build IoSlice array for the part of `frame` after `skip_bytes`.
fn remaining_slices(frame: &OutboundFrame, skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(2);

    if skip_bytes < HEADER_SIZE {
        slices.push(IoSlice::new(&frame.header[skip_bytes..]));
    }

    let payload_skip = skip_bytes.saturating_sub(HEADER_SIZE);
    if payload_skip < frame.payload.len() {
        slices.push(IoSlice::new(&frame.payload[payload_skip..]));
    }

    slices
}
