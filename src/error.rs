//! Error types for framelink.

use thiserror::Error;

/// Main error type for all framelink operations.
#[derive(Debug, Error)]
pub enum FramelinkError {
    /// I/O error on the TCP transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// MsgPack serialization error.
    #[error("MsgPack encode error: {0}")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// MsgPack deserialization error.
    #[error("MsgPack decode error: {0}")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Outgoing message could not be serialized by the registry.
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Inbound payload could not be interpreted by the registry.
    #[error("Decoding error: {0}")]
    Decoding(String),

    /// No message type registered for this (component, type) pair.
    #[error("Unknown message type {message_type} for component {component_id}")]
    UnknownMessageType { component_id: u16, message_type: u16 },

    /// Payload exceeds the configured ceiling.
    #[error("Payload size {size} exceeds maximum {max}")]
    PayloadTooLarge { size: u64, max: u32 },

    /// Inbound buffer could not grow to fit a payload.
    #[error("Could not allocate {requested} bytes for inbound payload")]
    ResourceExhausted { requested: usize },

    /// Outbound queue reached its configured bound.
    #[error("Outbound queue full ({0} frames)")]
    QueueFull(usize),

    /// No connection to send on.
    #[error("Not connected")]
    NotConnected,

    /// A connection or connection attempt is already live.
    #[error("Already connected")]
    AlreadyConnected,

    /// The I/O driver was shut down.
    #[error("I/O driver stopped")]
    DriverStopped,
}

/// Result type alias using FramelinkError.
pub type Result<T> = std::result::Result<T, FramelinkError>;
