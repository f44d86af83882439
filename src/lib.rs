//! # framelink
//!
//! Client for a length-prefixed, typed binary message protocol over TCP.
//!
//! Every frame is an 8-byte big-endian header followed by a payload:
//!
//! ```text
//! +--------------+--------------+----------------+-----------------+
//! | component_id | message_type |  payload_size  |     payload     |
//! |     u16      |     u16      |      u32       | payload_size B  |
//! +--------------+--------------+----------------+-----------------+
//! ```
//!
//! `(component_id, message_type)` selects how the payload is encoded. A
//! [`MessageRegistry`] maps those pairs to concrete message types; the
//! [`Client`] only moves bytes and reports what happened through an
//! [`EventSink`].
//!
//! ## Architecture
//!
//! - **Client** (any thread): `async_connect`, `send`, `disconnect`
//! - **I/O driver** (one worker thread): connect, receive loop, writes,
//!   event callbacks. Started on demand, exits when there is no work.
//!
//! ## Example
//!
//! ```no_run
//! use framelink::{ChannelSink, Client, ClientEvent, TypedRegistry};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Ping {
//!     seq: u32,
//! }
//!
//! # fn main() -> framelink::Result<()> {
//! let mut registry = TypedRegistry::new();
//! registry.register::<Ping>(1, 10);
//!
//! let (sink, mut events) = ChannelSink::new();
//! let client = Client::builder(registry).sink(sink).build()?;
//! client.async_connect("localhost", 7000)?;
//! client.send(1, 10, &framelink::AnyMessage::new(Ping { seq: 1 }))?;
//!
//! if let Some(ClientEvent::Message { message: Ok(message), .. }) = events.blocking_recv() {
//!     if let Some(ping) = message.downcast_ref::<Ping>() {
//!         println!("pong {}", ping.seq);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod driver;
pub mod error;
pub mod event;
pub mod outbound;
pub mod protocol;
pub mod registry;

mod client;
mod connection;

pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, PreConnectPolicy};
pub use connection::ConnectionState;
pub use error::{FramelinkError, Result};
pub use event::{ChannelSink, ClientEvent, Disconnect, DisconnectReason, EventSink, NullSink};
pub use registry::{AnyMessage, MessageRegistry, RawRegistry, TypedRegistry};
