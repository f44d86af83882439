//! Protocol module - wire format and inbound buffering.
//!
//! This module implements the framing layer:
//! - 8-byte header encoding/decoding
//! - Growable payload buffer for the receive loop

mod inbound_buffer;
mod wire_format;

pub use inbound_buffer::{InboundBuffer, DEFAULT_INBOUND_CAPACITY};
pub use wire_format::{
    build_frame, checked_payload_size, decode_header, encode_header, FrameHeader,
    DEFAULT_MAX_PAYLOAD_SIZE, HEADER_SIZE,
};
