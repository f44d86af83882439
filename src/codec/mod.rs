//! Codec module - serialization/deserialization for payloads.
//!
//! - [`RawCodec`] - Pass-through for raw bytes
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde`
//!
//! Codecs are marker structs with static methods rather than trait objects.
//! Registries pick one at compile time; see [`crate::registry`].

mod msgpack;
mod raw;

pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;
