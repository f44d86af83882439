//! Client configuration.
//!
//! [`ClientConfig`] carries every tunable of a session. It can be built
//! through [`ClientBuilder`](crate::ClientBuilder) or deserialized from any
//! serde format; missing fields take their defaults.
//!
//! ```
//! use framelink::{ClientConfig, PreConnectPolicy};
//!
//! let config = ClientConfig {
//!     pre_connect: PreConnectPolicy::Reject,
//!     ..ClientConfig::default()
//! };
//! assert_eq!(config.initial_buffer_size, 1024);
//! ```

use serde::{Deserialize, Serialize};

use crate::driver::DEFAULT_THREAD_NAME;
use crate::protocol::{DEFAULT_INBOUND_CAPACITY, DEFAULT_MAX_PAYLOAD_SIZE};

/// What `send` does before a connection is established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreConnectPolicy {
    /// Hold frames and write them once connected.
    #[default]
    Queue,
    /// Fail with `NotConnected`.
    Reject,
}

/// Session configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Initial inbound buffer size in bytes.
    pub initial_buffer_size: usize,
    /// Largest payload accepted in either direction.
    pub max_payload_size: u32,
    /// Maximum frames waiting behind the in-flight write (0 = unbounded).
    pub max_queued_frames: usize,
    /// Behavior of `send` before the first successful connect.
    pub pre_connect: PreConnectPolicy,
    /// Set `TCP_NODELAY` on established connections.
    pub nodelay: bool,
    /// Name of the I/O worker thread.
    pub thread_name: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            initial_buffer_size: DEFAULT_INBOUND_CAPACITY,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_queued_frames: 0,
            pre_connect: PreConnectPolicy::default(),
            nodelay: true,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }
}
