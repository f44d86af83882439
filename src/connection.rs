//! Connection session internals: connect, receive loop, and send drain.
//!
//! Everything in here runs on the I/O driver except the small set of
//! `Session` methods `Client` calls from application threads.
//!
//! Each `async_connect` creates a fresh [`Link`]. A link is closed exactly
//! once, by whoever gets there first: the connect task, the receive loop,
//! a failed write, or `disconnect()`. Only that winner reports the
//! disconnect, which is what makes `on_disconnected` fire exactly once per
//! attempt.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::watch;

use crate::config::{ClientConfig, PreConnectPolicy};
use crate::driver::DriverControl;
use crate::error::{FramelinkError, Result};
use crate::event::{Disconnect, DisconnectReason, EventSink};
use crate::outbound::{write_frame, OutboundFrame, OutboundQueue, QueueMode, Submitted};
use crate::protocol::{FrameHeader, InboundBuffer, HEADER_SIZE};
use crate::registry::MessageRegistry;

/// Connection lifecycle as seen by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection attempt made yet.
    Idle,
    /// Looking up the host.
    Resolving,
    /// Trying resolved addresses in order.
    Connecting,
    /// Receive loop running, frames being written.
    Connected,
    /// Last connection (or attempt) ended.
    Disconnected,
}

/// Write half of an established connection.
type LinkWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// One connection attempt: its write half and its close signal.
pub(crate) struct Link {
    id: u64,
    closed: AtomicBool,
    close_tx: watch::Sender<bool>,
    writer: tokio::sync::Mutex<Option<LinkWriter>>,
}

impl Link {
    fn new(id: u64) -> Self {
        let (close_tx, _) = watch::channel(false);
        Self {
            id,
            closed: AtomicBool::new(false),
            close_tx,
            writer: tokio::sync::Mutex::new(None),
        }
    }

    #[inline]
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed and wake every task waiting on this link.
    ///
    /// Returns `false` if it was already closed.
    fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.close_tx.send_replace(true);
        true
    }

    /// Resolves once the link is closed.
    async fn closed(&self) {
        let mut rx = self.close_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

struct Slot {
    state: ConnectionState,
    link: Option<Arc<Link>>,
    next_id: u64,
}

/// State shared by `Client` and every task it spawns.
pub(crate) struct Session<R: MessageRegistry> {
    registry: R,
    sink: Arc<dyn EventSink<R::Message>>,
    config: ClientConfig,
    /// Lock order: `slot` before `outbound`.
    slot: Mutex<Slot>,
    outbound: Mutex<OutboundQueue<Arc<Link>>>,
    torn_down: AtomicBool,
    driver: Arc<DriverControl>,
}

impl<R: MessageRegistry> Session<R> {
    pub(crate) fn new(
        registry: R,
        sink: Arc<dyn EventSink<R::Message>>,
        config: ClientConfig,
        driver: Arc<DriverControl>,
    ) -> Self {
        let mode = match config.pre_connect {
            PreConnectPolicy::Queue => QueueMode::Buffering,
            PreConnectPolicy::Reject => QueueMode::Closed,
        };
        let outbound = OutboundQueue::new(mode, config.max_queued_frames);

        Self {
            registry,
            sink,
            config,
            slot: Mutex::new(Slot {
                state: ConnectionState::Idle,
                link: None,
                next_id: 0,
            }),
            outbound: Mutex::new(outbound),
            torn_down: AtomicBool::new(false),
            driver,
        }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.slot.lock().state
    }

    pub(crate) fn queued_frames(&self) -> usize {
        self.outbound.lock().len()
    }

    /// Install a fresh link for a new connect attempt.
    pub(crate) fn begin_connect(&self) -> Result<Arc<Link>> {
        let mut slot = self.slot.lock();
        if slot.link.as_ref().is_some_and(|link| !link.is_closed()) {
            return Err(FramelinkError::AlreadyConnected);
        }

        slot.next_id += 1;
        let link = Arc::new(Link::new(slot.next_id));
        slot.link = Some(link.clone());
        slot.state = ConnectionState::Resolving;

        if self.config.pre_connect == PreConnectPolicy::Queue {
            self.outbound.lock().buffer();
        }
        Ok(link)
    }

    /// Encode and queue (or start writing) one frame.
    ///
    /// Returns the drain the caller must schedule, if any.
    pub(crate) fn submit(
        &self,
        component_id: u16,
        message_type: u16,
        message: &R::Message,
    ) -> Result<Option<(Arc<Link>, OutboundFrame)>> {
        let payload = self
            .registry
            .serialize(component_id, message_type, message)?;
        let frame = OutboundFrame::new(
            component_id,
            message_type,
            payload,
            self.config.max_payload_size,
        )?;

        match self.outbound.lock().submit(frame)? {
            Submitted::Drain(link, frame) => Ok(Some((link, frame))),
            Submitted::Queued => Ok(None),
        }
    }

    /// Close the current link without notifying anyone.
    ///
    /// Returns the link and the number of dropped frames if this call
    /// closed it.
    pub(crate) fn detach_current(&self) -> Option<(Arc<Link>, usize)> {
        let link = self.slot.lock().link.clone()?;
        self.detach(&link).map(|undelivered| (link, undelivered))
    }

    fn detach(&self, link: &Link) -> Option<usize> {
        if !link.close() {
            return None;
        }

        let mut slot = self.slot.lock();
        if slot.link.as_ref().is_some_and(|current| current.id == link.id) {
            slot.state = ConnectionState::Disconnected;
            slot.link = None;
        }
        let undelivered = self.outbound.lock().reset(QueueMode::Closed);
        Some(undelivered)
    }

    /// Close `link` and report `reason`, unless someone else closed it first.
    pub(crate) fn fail(&self, link: &Link, reason: DisconnectReason) {
        let Some(undelivered) = self.detach(link) else {
            tracing::trace!(link = link.id, "already closed: {}", reason);
            return;
        };

        if undelivered > 0 {
            tracing::warn!(undelivered, "dropping queued frames: {}", reason);
        }
        tracing::info!(link = link.id, "disconnected: {}", reason);
        self.emit_disconnected(Disconnect {
            reason,
            undelivered,
        });
    }

    /// Mark `link` connected and open the queue on it, in one step, so
    /// nobody can observe `Connected` while `send` would still be refused.
    ///
    /// Returns `None` if the link was closed first, otherwise the first
    /// frame buffered before connect, if any.
    fn establish(&self, link: &Arc<Link>) -> Option<Option<OutboundFrame>> {
        let mut slot = self.slot.lock();
        // A concurrent detach sets `closed` before it takes these locks.
        if link.is_closed() {
            return None;
        }
        if slot.link.as_ref().is_some_and(|current| current.id == link.id) {
            slot.state = ConnectionState::Connected;
        }
        Some(self.outbound.lock().open(link.clone()))
    }

    fn set_state(&self, link: &Link, state: ConnectionState) {
        let mut slot = self.slot.lock();
        if link.is_closed() {
            return;
        }
        if slot.link.as_ref().is_some_and(|current| current.id == link.id) {
            slot.state = state;
        }
    }

    /// Stop emitting events; used when the owning `Client` is dropped.
    pub(crate) fn tear_down(&self) {
        self.torn_down.store(true, Ordering::Release);
    }

    #[inline]
    fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::Acquire)
    }

    // A callback that passed the check just before `tear_down` may still be
    // running; `Client::drop` waits for it by joining the worker.
    fn emit_connected(&self) {
        if !self.is_torn_down() {
            self.sink.on_connected();
        }
    }

    pub(crate) fn emit_disconnected(&self, disconnect: Disconnect) {
        if !self.is_torn_down() {
            self.sink.on_disconnected(disconnect);
        }
    }

    fn emit_message(&self, header: &FrameHeader, message: Result<R::Message>) {
        if !self.is_torn_down() {
            self.sink
                .on_message(header.component_id, header.message_type, message);
        }
    }
}

/// Connect task: resolve, connect, then run the receive loop until the
/// link closes.
pub(crate) async fn run<R: MessageRegistry>(
    session: Arc<Session<R>>,
    link: Arc<Link>,
    host: String,
    port: u16,
) {
    let stream = tokio::select! {
        biased;
        _ = link.closed() => return,
        result = open_stream(&session, &link, &host, port) => result,
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(reason) => {
            session.fail(&link, reason);
            return;
        }
    };

    if let Err(e) = stream.set_nodelay(session.config.nodelay) {
        tracing::debug!("could not set TCP_NODELAY: {}", e);
    }
    let (reader, writer) = stream.into_split();
    *link.writer.lock().await = Some(Box::new(writer));

    let Some(first) = session.establish(&link) else {
        return;
    };
    tracing::info!(link = link.id, host = %host, port, "connected");
    session.emit_connected();

    if let Some(frame) = first {
        tracing::debug!("flushing frames sent before connect");
        session
            .driver
            .spawn_local(drain(session.clone(), link.clone(), frame));
    }
    receive_loop(&session, &link, reader).await;
}

async fn open_stream<R: MessageRegistry>(
    session: &Session<R>,
    link: &Link,
    host: &str,
    port: u16,
) -> std::result::Result<TcpStream, DisconnectReason> {
    tracing::debug!(host, port, "resolving");
    let addrs: Vec<_> = lookup_host((host, port))
        .await
        .map_err(DisconnectReason::Resolve)?
        .collect();

    if addrs.is_empty() {
        return Err(DisconnectReason::Resolve(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no addresses for {}", host),
        )));
    }

    session.set_state(link, ConnectionState::Connecting);

    let mut last_error = None;
    for addr in addrs {
        tracing::debug!(%addr, "connecting");
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                tracing::debug!(%addr, "connect failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    Err(DisconnectReason::Connect(last_error.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotConnected, "no address accepted the connection")
    })))
}

/// Receive loop: header, payload, dispatch, repeat.
async fn receive_loop<R: MessageRegistry>(
    session: &Session<R>,
    link: &Link,
    mut reader: OwnedReadHalf,
) {
    let config = &session.config;
    let mut buffer =
        InboundBuffer::with_capacity_and_max_payload(config.initial_buffer_size, config.max_payload_size);
    let mut header_bytes = [0u8; HEADER_SIZE];

    let reason = loop {
        let read = tokio::select! {
            biased;
            _ = link.closed() => return,
            read = read_header(&mut reader, &mut header_bytes) => read,
        };
        match read {
            Ok(true) => {}
            Ok(false) => break DisconnectReason::PeerClosed,
            Err(e) => break DisconnectReason::Transport(e),
        }

        let header = FrameHeader::from_bytes(&header_bytes);
        let payload = match buffer.prepare(&header) {
            Ok(payload) => payload,
            Err(FramelinkError::PayloadTooLarge { size, max }) => {
                break DisconnectReason::PayloadTooLarge { size, max }
            }
            Err(FramelinkError::ResourceExhausted { requested }) => {
                break DisconnectReason::ResourceExhausted { requested }
            }
            Err(e) => break DisconnectReason::Transport(io::Error::other(e)),
        };

        let read = tokio::select! {
            biased;
            _ = link.closed() => return,
            read = reader.read_exact(payload) => read,
        };
        if let Err(e) = read {
            break DisconnectReason::Transport(e);
        }

        let message = session
            .registry
            .deserialize(&header, buffer.filled(header.payload_len()));
        if let Err(e) = &message {
            tracing::warn!(
                component_id = header.component_id,
                message_type = header.message_type,
                "failed to decode message: {}",
                e
            );
        }

        if link.is_closed() {
            return;
        }
        session.emit_message(&header, message);
    };

    session.fail(link, reason);
}

/// Read a full header.
///
/// Returns `Ok(false)` if the stream ended cleanly before the first byte,
/// and `UnexpectedEof` if it ended partway through.
async fn read_header<S>(reader: &mut S, buf: &mut [u8; HEADER_SIZE]) -> io::Result<bool>
where
    S: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < HEADER_SIZE {
        match reader.read(&mut buf[filled..]).await? {
            0 if filled == 0 => return Ok(false),
            0 => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream ended inside a frame header",
                ))
            }
            n => filled += n,
        }
    }
    Ok(true)
}

/// Send drain: write `frame`, then keep popping the queue until it is empty.
pub(crate) async fn drain<R: MessageRegistry>(
    session: Arc<Session<R>>,
    link: Arc<Link>,
    mut frame: OutboundFrame,
) {
    loop {
        let written = {
            let mut writer = link.writer.lock().await;
            let Some(writer) = writer.as_mut() else {
                return;
            };
            tokio::select! {
                biased;
                _ = link.closed() => return,
                written = write_frame(writer, &frame) => written,
            }
        };

        let header = frame.frame_header();
        drop(frame);

        if let Err(e) = written {
            tracing::warn!(
                component_id = header.component_id,
                message_type = header.message_type,
                "write failed: {}",
                e
            );
            session.fail(&link, DisconnectReason::Transport(e));
            return;
        }
        tracing::trace!(
            component_id = header.component_id,
            message_type = header.message_type,
            size = header.payload_size,
            "frame sent"
        );

        let next = {
            let mut outbound = session.outbound.lock();
            if link.is_closed() {
                return;
            }
            outbound.complete()
        };
        match next {
            Some(next) => frame = next,
            None => return,
        }
    }
}
