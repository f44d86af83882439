//! Client builder and public handle.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the session.
//! The [`Client`] manages the lifecycle:
//! 1. `async_connect` resolves the host and connects in the background
//! 2. `on_connected` fires once the stream is up
//! 3. Inbound frames are decoded and handed to `on_message`
//! 4. `send` queues frames; they are written one at a time, in order
//! 5. `on_disconnected` fires exactly once when the connection ends
//!
//! # Example
//!
//! ```no_run
//! use bytes::Bytes;
//! use framelink::{ChannelSink, Client, ClientEvent, RawRegistry};
//!
//! # fn main() -> framelink::Result<()> {
//! let (sink, mut events) = ChannelSink::new();
//! let client = Client::builder(RawRegistry)
//!     .sink(sink)
//!     .max_payload_size(1024 * 1024)
//!     .build()?;
//!
//! client.async_connect("localhost", 7000)?;
//! client.send(1, 10, &Bytes::from_static(b"ping"))?;
//!
//! while let Some(event) = events.blocking_recv() {
//!     match event {
//!         ClientEvent::Message { message, .. } => println!("{:?}", message),
//!         ClientEvent::Disconnected(d) => {
//!             println!("{}", d);
//!             break;
//!         }
//!         ClientEvent::Connected => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::config::{ClientConfig, PreConnectPolicy};
use crate::connection::{drain, run, ConnectionState, Session};
use crate::driver::IoDriver;
use crate::error::Result;
use crate::event::{Disconnect, DisconnectReason, EventSink, NullSink};
use crate::registry::MessageRegistry;

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder<R: MessageRegistry> {
    registry: R,
    sink: Arc<dyn EventSink<R::Message>>,
    config: ClientConfig,
}

impl<R: MessageRegistry> ClientBuilder<R> {
    /// Create a builder around `registry` with default settings and no sink.
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            sink: Arc::new(NullSink),
            config: ClientConfig::default(),
        }
    }

    /// Set the event sink.
    pub fn sink<S>(self, sink: S) -> Self
    where
        S: EventSink<R::Message>,
    {
        self.sink_arc(Arc::new(sink))
    }

    /// Set an event sink the application keeps a handle to.
    pub fn sink_arc(mut self, sink: Arc<dyn EventSink<R::Message>>) -> Self {
        self.sink = sink;
        self
    }

    /// Replace the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the initial inbound buffer size.
    ///
    /// Default: 1024
    pub fn initial_buffer_size(mut self, size: usize) -> Self {
        self.config.initial_buffer_size = size;
        self
    }

    /// Set the largest payload accepted in either direction.
    ///
    /// Default: 64 MiB
    pub fn max_payload_size(mut self, size: u32) -> Self {
        self.config.max_payload_size = size;
        self
    }

    /// Limit the number of frames waiting behind the current write.
    ///
    /// `0` means unbounded. Default: 0
    pub fn max_queued_frames(mut self, limit: usize) -> Self {
        self.config.max_queued_frames = limit;
        self
    }

    /// Choose what `send` does before the connection is up.
    pub fn pre_connect(mut self, policy: PreConnectPolicy) -> Self {
        self.config.pre_connect = policy;
        self
    }

    /// Enable or disable `TCP_NODELAY`.
    ///
    /// Default: true
    pub fn nodelay(mut self, nodelay: bool) -> Self {
        self.config.nodelay = nodelay;
        self
    }

    /// Name the I/O worker thread.
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.config.thread_name = name.into();
        self
    }

    /// Build the client. No thread is started until there is work.
    pub fn build(self) -> Result<Client<R>> {
        let driver = IoDriver::with_thread_name(&self.config.thread_name)?;
        let session = Session::new(self.registry, self.sink, self.config, driver.control());

        Ok(Client {
            session: Arc::new(session),
            driver,
        })
    }
}

/// A message client bound to one registry.
///
/// All methods may be called from any thread. Event callbacks run on the
/// I/O worker thread.
pub struct Client<R: MessageRegistry> {
    session: Arc<Session<R>>,
    driver: IoDriver,
}

impl<R: MessageRegistry> Client<R> {
    /// Create a new client builder.
    pub fn builder(registry: R) -> ClientBuilder<R> {
        ClientBuilder::new(registry)
    }

    /// Start connecting to `host:port` and return immediately.
    ///
    /// The outcome is reported through `on_connected`, or through
    /// `on_disconnected` with a `Resolve` or `Connect` reason.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` while a previous attempt is still live.
    /// - `Io` if the I/O worker cannot be started.
    pub fn async_connect(&self, host: &str, port: u16) -> Result<()> {
        let link = self.session.begin_connect()?;
        tracing::debug!(host, port, "connect scheduled");

        let task = run(self.session.clone(), link.clone(), host.to_string(), port);
        if let Err(e) = self.driver.spawn(task) {
            self.session.detach_current();
            return Err(e);
        }
        Ok(())
    }

    /// Serialize `message` and queue it for sending.
    ///
    /// Frames from one thread go out in call order. Write failures are not
    /// reported here; they end the connection instead.
    ///
    /// # Errors
    ///
    /// - Registry errors (`UnknownMessageType`, `Encoding`, ...).
    /// - `PayloadTooLarge` if the encoded payload exceeds the ceiling.
    /// - `NotConnected` when no connection is up and frames are not being
    ///   buffered.
    /// - `QueueFull` when the queue limit is reached.
    pub fn send(&self, component_id: u16, message_type: u16, message: &R::Message) -> Result<()> {
        let Some((link, frame)) = self.session.submit(component_id, message_type, message)? else {
            return Ok(());
        };

        let task = drain(self.session.clone(), link.clone(), frame);
        if let Err(e) = self.driver.spawn(task) {
            tracing::error!("could not schedule write: {}", e);
            self.session.fail(&link, DisconnectReason::Transport(std::io::Error::other(e)));
        }
        Ok(())
    }

    /// Close the connection.
    ///
    /// Queued frames are dropped and `on_disconnected` fires once with
    /// [`DisconnectReason::Requested`]. A no-op if nothing is connected.
    pub fn disconnect(&self) {
        let Some((_, undelivered)) = self.session.detach_current() else {
            return;
        };
        tracing::info!(undelivered, "disconnect requested");

        let session = self.session.clone();
        let notify = async move {
            session.emit_disconnected(Disconnect {
                reason: DisconnectReason::Requested,
                undelivered,
            });
        };
        if let Err(e) = self.driver.spawn(notify) {
            tracing::warn!("could not schedule disconnect notification: {}", e);
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.session.state()
    }

    /// Check if the connection is up.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Number of frames waiting behind the write in flight.
    pub fn queued_frames(&self) -> usize {
        self.session.queued_frames()
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        self.session.config()
    }
}

impl<R: MessageRegistry> Drop for Client<R> {
    fn drop(&mut self) {
        self.session.tear_down();
        self.session.detach_current();
        self.driver.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FramelinkError;
    use crate::registry::RawRegistry;
    use bytes::Bytes;

    #[test]
    fn test_builder_defaults() {
        let builder = Client::builder(RawRegistry);

        assert_eq!(builder.config.initial_buffer_size, 1024);
        assert_eq!(builder.config.max_queued_frames, 0);
        assert_eq!(builder.config.pre_connect, PreConnectPolicy::Queue);
        assert!(builder.config.nodelay);
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Client::builder(RawRegistry)
            .initial_buffer_size(4096)
            .max_payload_size(1 << 20)
            .max_queued_frames(16)
            .pre_connect(PreConnectPolicy::Reject)
            .nodelay(false)
            .thread_name("test-io");

        assert_eq!(builder.config.initial_buffer_size, 4096);
        assert_eq!(builder.config.max_payload_size, 1 << 20);
        assert_eq!(builder.config.max_queued_frames, 16);
        assert_eq!(builder.config.pre_connect, PreConnectPolicy::Reject);
        assert!(!builder.config.nodelay);
        assert_eq!(builder.config.thread_name, "test-io");
    }

    #[test]
    fn test_new_client_is_idle() {
        let client = Client::builder(RawRegistry).build().unwrap();

        assert_eq!(client.state(), ConnectionState::Idle);
        assert!(!client.is_connected());
        assert_eq!(client.queued_frames(), 0);
    }

    #[test]
    fn test_send_before_connect_is_buffered() {
        let client = Client::builder(RawRegistry).build().unwrap();

        client.send(1, 1, &Bytes::from_static(b"a")).unwrap();
        client.send(1, 2, &Bytes::from_static(b"b")).unwrap();

        assert_eq!(client.queued_frames(), 2);
        assert_eq!(client.state(), ConnectionState::Idle);
    }

    #[test]
    fn test_send_before_connect_rejected() {
        let client = Client::builder(RawRegistry)
            .pre_connect(PreConnectPolicy::Reject)
            .build()
            .unwrap();

        let err = client.send(1, 1, &Bytes::from_static(b"a")).unwrap_err();
        assert!(matches!(err, FramelinkError::NotConnected));
    }

    #[test]
    fn test_send_respects_queue_limit() {
        let client = Client::builder(RawRegistry)
            .max_queued_frames(1)
            .build()
            .unwrap();

        client.send(1, 1, &Bytes::from_static(b"a")).unwrap();
        let err = client.send(1, 1, &Bytes::from_static(b"b")).unwrap_err();
        assert!(matches!(err, FramelinkError::QueueFull(1)));
    }

    #[test]
    fn test_send_rejects_oversized_payload() {
        let client = Client::builder(RawRegistry)
            .max_payload_size(4)
            .build()
            .unwrap();

        let err = client
            .send(1, 1, &Bytes::from_static(b"too long"))
            .unwrap_err();
        assert!(matches!(err, FramelinkError::PayloadTooLarge { size: 8, max: 4 }));
        assert_eq!(client.queued_frames(), 0);
    }

    #[test]
    fn test_disconnect_when_idle_is_noop() {
        let client = Client::builder(RawRegistry).build().unwrap();
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Idle);
    }
}
