use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{BufReader, BufWriter};
use tokio::sync::{Notify, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep_until};
use tracing::{debug, info, warn};

use crate::codec::{FrameCallback, FrameReader, FrameWriter};
use crate::config::Config;
use crate::connection::queue::{CloseMarker, OutboundQueue, Outgoing};
use crate::connection::streams::{BoxedSink, BoxedSource};
use crate::connection::{ConnectionState, Role, Streams, WebSocketListener};
use crate::error::{Error, Result};
use crate::message::{CloseCode, CloseFrame, Message};
use crate::protocol::{HandshakeResponse, MAX_CLOSE_REASON, generate_key};

type Reader = FrameReader<BufReader<BoxedSource>>;
type Writer = FrameWriter<BufWriter<BoxedSink>>;

/// Teardown signal shared by the reader loop and the writer task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    /// Both close frames exchanged: finish the frame in flight, then stop.
    Drained,
    /// Failed or canceled: stop immediately.
    Aborted,
}

/// Mutable connection fields, guarded by one lock.
#[derive(Debug)]
struct Shared {
    state: ConnectionState,
    role: Option<Role>,
    queue: OutboundQueue,
    received_close: Option<(u16, String)>,
    awaiting_pong: bool,
    sent_ping_count: u64,
    received_ping_count: u64,
    received_pong_count: u64,
    cancel_deadline: Option<Instant>,
}

struct Inner {
    name: String,
    key: String,
    config: Config,
    listener: Arc<dyn WebSocketListener>,
    shared: Mutex<Shared>,
    wake: Notify,
    lifecycle: watch::Sender<Lifecycle>,
    reader: Mutex<Option<Reader>>,
    /// Live application handles; the writer task's own handle is not counted.
    handles: AtomicUsize,
}

/// A full-duplex WebSocket connection.
///
/// Sending never blocks: [`send`](Self::send) and [`close`](Self::close)
/// enqueue and return, and a per-connection writer task puts frames on the
/// wire in order, with pong replies jumping the queue. Inbound frames are
/// decoded by whichever task runs [`loop_reader`](Self::loop_reader), which
/// reports them to the [`WebSocketListener`].
///
/// The handle is cheap to clone; all clones refer to the same connection.
/// Dropping the last clone of a started connection cancels it, so keep one
/// alive until [`close`](Self::close) has completed.
///
/// ## Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use rsws_duplex::{Config, Role, Streams, WebSocket, WebSocketListener};
///
/// struct Printer;
/// impl WebSocketListener for Printer {}
///
/// let stream = tokio::net::TcpStream::connect("example.com:80").await?;
/// // ... perform the HTTP upgrade using `ws.key()` ...
/// let ws = WebSocket::new("example", Config::default(), Arc::new(Printer));
/// ws.start(Streams::from_io(Role::Client, stream))?;
/// ws.send_text("hello");
/// ws.loop_reader().await;
/// ```
pub struct WebSocket {
    inner: Arc<Inner>,
    counted: bool,
}

impl Clone for WebSocket {
    fn clone(&self) -> Self {
        self.inner.handles.fetch_add(1, Ordering::Relaxed);
        Self {
            inner: Arc::clone(&self.inner),
            counted: true,
        }
    }
}

impl Drop for WebSocket {
    fn drop(&mut self) {
        if !self.counted || self.inner.handles.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        if matches!(
            self.state(),
            ConnectionState::Open | ConnectionState::Closing
        ) {
            debug!(name = %self.inner.name, "last handle dropped");
            self.cancel();
        }
    }
}

impl std::fmt::Debug for WebSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocket")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl WebSocket {
    /// Create a connection that is waiting for its streams.
    ///
    /// A fresh `Sec-WebSocket-Key` is generated for the upgrade request.
    pub fn new<L: WebSocketListener>(
        name: impl Into<String>,
        config: Config,
        listener: Arc<L>,
    ) -> Self {
        let (lifecycle, _) = watch::channel(Lifecycle::Running);
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                key: generate_key(),
                config,
                listener,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Connecting,
                    role: None,
                    queue: OutboundQueue::new(),
                    received_close: None,
                    awaiting_pong: false,
                    sent_ping_count: 0,
                    received_ping_count: 0,
                    received_pong_count: 0,
                    cancel_deadline: None,
                }),
                wake: Notify::new(),
                lifecycle,
                reader: Mutex::new(None),
                handles: AtomicUsize::new(1),
            }),
            counted: true,
        }
    }

    /// Name used in log events.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The `Sec-WebSocket-Key` for the upgrade request.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    /// The role given by the streams, once started.
    #[must_use]
    pub fn role(&self) -> Option<Role> {
        self.lock().role
    }

    /// Payload bytes enqueued but not yet written.
    #[must_use]
    pub fn queue_size(&self) -> u64 {
        self.lock().queue.queue_size()
    }

    /// The peer's close frame, once received.
    #[must_use]
    pub fn peer_close(&self) -> Option<CloseFrame> {
        self.lock()
            .received_close
            .as_ref()
            .map(|(code, reason)| CloseFrame::new(CloseCode::from_u16(*code), reason.clone()))
    }

    #[must_use]
    pub fn sent_ping_count(&self) -> u64 {
        self.lock().sent_ping_count
    }

    #[must_use]
    pub fn received_ping_count(&self) -> u64 {
        self.lock().received_ping_count
    }

    #[must_use]
    pub fn received_pong_count(&self) -> u64 {
        self.lock().received_pong_count
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn reader_slot(&self) -> MutexGuard<'_, Option<Reader>> {
        self.inner
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lifecycle(&self) -> Lifecycle {
        *self.inner.lifecycle.borrow()
    }

    /// Check the server's upgrade response against [`key`](Self::key).
    ///
    /// A mismatch fails the connection, handing `response` to
    /// [`WebSocketListener::on_failure`].
    ///
    /// # Errors
    ///
    /// Returns the [`Error::InvalidHandshake`] that failed the connection.
    pub fn check_upgrade(&self, response: &HandshakeResponse) -> Result<()> {
        response.verify(&self.inner.key).inspect_err(|error| {
            self.fail(error.clone(), Some(response));
        })
    }

    /// Attach the streams, spawn the writer task and report `on_open`.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// [`Error::AlreadyStarted`] unless the connection is still `Connecting`.
    pub fn start(&self, streams: Streams) -> Result<()> {
        let Streams { role, source, sink } = streams;
        {
            let mut shared = self.lock();
            if shared.state != ConnectionState::Connecting {
                return Err(Error::AlreadyStarted);
            }
            // A close enqueued before the streams arrived still goes out.
            shared.state = if shared.queue.enqueued_close() {
                ConnectionState::Closing
            } else {
                ConnectionState::Open
            };
            shared.role = Some(role);
        }

        let config = &self.inner.config;
        let reader = FrameReader::new(
            BufReader::with_capacity(config.read_buffer_size, source),
            role,
            config.limits.clone(),
        );
        let writer = FrameWriter::new(
            BufWriter::with_capacity(config.write_buffer_size, sink),
            role,
            config.fragment_size,
        );
        *self.reader_slot() = Some(reader);
        let task = Self {
            inner: Arc::clone(&self.inner),
            counted: false,
        };
        tokio::spawn(task.write_loop(writer));

        info!(name = %self.inner.name, %role, "connection open");
        self.inner.listener.on_open(self);
        Ok(())
    }

    /// Read frames until the peer's close frame arrives or the connection
    /// fails.
    ///
    /// Listener callbacks run on the calling task. Returns immediately if the
    /// connection was never started or the reader is already running.
    pub async fn loop_reader(&self) {
        let Some(mut reader) = self.reader_slot().take() else {
            return;
        };
        let mut lifecycle = self.inner.lifecycle.subscribe();

        while !reader.is_closed() {
            let result = tokio::select! {
                biased;
                () = wait_until(&mut lifecycle, |l| l != Lifecycle::Running) => return,
                result = reader.process_next_frame(self) => result,
            };
            if let Err(error) = result {
                self.fail(error, None);
                return;
            }
        }
        debug!(name = %self.inner.name, "reader finished");
    }

    /// [`start`](Self::start) followed by [`loop_reader`](Self::loop_reader).
    ///
    /// # Errors
    ///
    /// See [`start`](Self::start).
    pub async fn run(&self, streams: Streams) -> Result<()> {
        self.start(streams)?;
        self.loop_reader().await;
        Ok(())
    }

    /// Enqueue a message.
    ///
    /// Returns `false` if the connection failed or is closing. Also returns
    /// `false` if the message would push the outbound queue past
    /// `max_queue_size`; the connection is then closed with 1001.
    pub fn send(&self, message: Message) -> bool {
        let len = message.len() as u64;
        {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Failed || shared.queue.enqueued_close() {
                return false;
            }
            if shared
                .queue
                .would_overflow(len, self.inner.config.max_queue_size)
            {
                drop(shared);
                warn!(
                    name = %self.inner.name,
                    len,
                    max = self.inner.config.max_queue_size,
                    "outbound queue full, closing"
                );
                // 1001 with an empty reason is always valid.
                let _ = self.close(CloseCode::GoingAway.as_u16(), "");
                return false;
            }
            shared.queue.push_message(message);
        }
        debug!(name = %self.inner.name, len, "message enqueued");
        self.inner.wake.notify_one();
        true
    }

    /// Enqueue a text message. See [`send`](Self::send).
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.send(Message::text(text))
    }

    /// Enqueue a binary message. See [`send`](Self::send).
    pub fn send_binary(&self, data: impl Into<Bytes>) -> bool {
        self.send(Message::binary(data))
    }

    /// Start the close handshake, waiting at most the configured
    /// `close_timeout` for the peer's close frame.
    ///
    /// # Errors
    ///
    /// See [`close_with_timeout`](Self::close_with_timeout).
    pub fn close(&self, code: u16, reason: &str) -> Result<bool> {
        self.close_with_timeout(code, reason, self.inner.config.close_timeout)
    }

    /// Enqueue a close frame after any pending messages.
    ///
    /// Once the frame is written, the connection is canceled if the peer's
    /// close does not arrive within `cancel_after`. Returns `false` if the
    /// connection already failed or a close was already enqueued.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidCloseCode`] or [`Error::CloseReasonTooLong`]. These do
    /// not affect the connection.
    pub fn close_with_timeout(
        &self,
        code: u16,
        reason: &str,
        cancel_after: Duration,
    ) -> Result<bool> {
        CloseCode::validate(code)?;
        if reason.len() > MAX_CLOSE_REASON {
            return Err(Error::CloseReasonTooLong(reason.len()));
        }

        {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Failed {
                return Ok(false);
            }
            let marker = CloseMarker {
                code,
                reason: reason.to_owned(),
                cancel_after,
            };
            if !shared.queue.push_close(marker) {
                return Ok(false);
            }
            if shared.state == ConnectionState::Open {
                shared.state = ConnectionState::Closing;
            }
        }

        info!(name = %self.inner.name, code, reason, "close enqueued");
        self.inner.wake.notify_one();
        Ok(true)
    }

    /// Abort the connection without a close handshake.
    pub fn cancel(&self) {
        self.fail(Error::Canceled, None);
    }

    /// Fail the connection and release its streams.
    ///
    /// Only the first call on an unfinished connection has any effect: it
    /// stops both loops and reports `on_failure`.
    pub fn fail(&self, error: Error, response: Option<&HandshakeResponse>) {
        {
            let mut shared = self.lock();
            if shared.state.is_terminal() {
                return;
            }
            shared.state = ConnectionState::Failed;
            shared.cancel_deadline = None;
        }

        self.inner.lifecycle.send_replace(Lifecycle::Aborted);
        // A reader that never ran still holds the source half.
        drop(self.reader_slot().take());

        warn!(name = %self.inner.name, %error, "connection failed");
        self.inner.listener.on_failure(self, &error, response);
    }

    async fn write_loop(self, mut writer: Writer) {
        let mut lifecycle = self.inner.lifecycle.subscribe();
        let mut ticker = self.inner.config.ping_interval.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            let deadline = self.lock().cancel_deadline;
            tokio::select! {
                biased;
                () = wait_until(&mut lifecycle, |l| l != Lifecycle::Running) => break,
                () = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.on_cancel_deadline();
                }
                () = next_tick(&mut ticker) => {
                    until_aborted(&mut lifecycle, self.write_ping_frame(&mut writer)).await;
                }
                () = self.inner.wake.notified() => {
                    until_aborted(&mut lifecycle, self.drain(&mut writer)).await;
                }
            }
        }

        if self.lifecycle() == Lifecycle::Drained {
            if let Err(error) = writer.shutdown().await {
                debug!(name = %self.inner.name, %error, "sink shutdown failed");
            }
        }
        debug!(name = %self.inner.name, "writer finished");
    }

    fn on_cancel_deadline(&self) {
        let expired = self
            .lock()
            .cancel_deadline
            .is_some_and(|deadline| deadline <= Instant::now());
        if expired {
            info!(name = %self.inner.name, "peer did not close in time");
            self.cancel();
        }
    }

    async fn drain(&self, writer: &mut Writer) {
        loop {
            match self.write_one_frame(writer).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(error) => {
                    self.fail(error, None);
                    return;
                }
            }
        }
    }

    /// Write the next queued frame. Returns `false` when there was nothing
    /// to write.
    async fn write_one_frame(&self, writer: &mut Writer) -> Result<bool> {
        let (next, peer_close) = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Failed {
                return Ok(false);
            }
            let Some(next) = shared.queue.pop_next() else {
                return Ok(false);
            };
            let mut peer_close = None;
            if let Outgoing::Close(close) = &next {
                match &shared.received_close {
                    Some(received) => peer_close = Some(received.clone()),
                    None => shared.cancel_deadline = Some(Instant::now() + close.cancel_after),
                }
            }
            (next, peer_close)
        };

        match next {
            Outgoing::Pong(payload) => writer.write_pong(&payload).await?,
            Outgoing::Message(message) => {
                let len = message.len() as u64;
                writer
                    .write_message(message.opcode(), message.payload())
                    .await?;
                self.lock().queue.complete_message(len);
            }
            Outgoing::Close(close) => {
                writer.write_close(Some(close.code), &close.reason).await?;
                debug!(name = %self.inner.name, code = close.code, "close frame written");
                if let Some((code, reason)) = peer_close {
                    self.finish_close(code, &reason);
                }
            }
        }
        Ok(true)
    }

    /// Both close frames are out: mark closed, stop both loops and report.
    fn finish_close(&self, code: u16, reason: &str) {
        {
            let mut shared = self.lock();
            if shared.state.is_terminal() {
                return;
            }
            shared.state = ConnectionState::Closed;
            shared.cancel_deadline = None;
        }
        self.inner.lifecycle.send_replace(Lifecycle::Drained);
        info!(name = %self.inner.name, code, reason, "connection closed");
        self.inner.listener.on_closed(self, code, reason);
    }

    async fn write_ping_frame(&self, writer: &mut Writer) {
        let writer_closed = writer.is_closed();
        let failed_ping = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Failed {
                return;
            }
            let failed_ping = shared.awaiting_pong.then_some(shared.sent_ping_count);
            if failed_ping.is_none() && writer_closed {
                return;
            }
            shared.sent_ping_count += 1;
            shared.awaiting_pong = true;
            failed_ping
        };

        if let Some(failed_ping) = failed_ping {
            self.fail(
                Error::PingTimeout {
                    interval_ms: self.inner.config.ping_interval_millis(),
                    successful: failed_ping.saturating_sub(1),
                },
                None,
            );
            return;
        }

        if let Err(error) = writer.write_ping(&[]).await {
            self.fail(error, None);
        }
    }
}

impl FrameCallback for WebSocket {
    fn on_read_message(&self, message: Message) {
        self.inner.listener.on_message(self, message);
    }

    fn on_read_ping(&self, payload: Bytes) {
        {
            let mut shared = self.lock();
            // Nothing may follow a close frame that is already on its way.
            if shared.state == ConnectionState::Failed
                || (shared.queue.enqueued_close() && shared.queue.is_message_queue_empty())
            {
                return;
            }
            shared.queue.push_pong(payload);
            shared.received_ping_count += 1;
        }
        self.inner.wake.notify_one();
    }

    fn on_read_pong(&self, _payload: Bytes) {
        let mut shared = self.lock();
        shared.received_pong_count += 1;
        shared.awaiting_pong = false;
    }

    fn on_read_close(&self, code: u16, reason: String) {
        let closed = {
            let mut shared = self.lock();
            shared.received_close = Some((code, reason.clone()));
            let drained = shared.queue.enqueued_close() && shared.queue.is_message_queue_empty();
            if drained && !shared.state.is_terminal() {
                shared.state = ConnectionState::Closed;
                shared.cancel_deadline = None;
                true
            } else {
                if shared.state == ConnectionState::Open {
                    shared.state = ConnectionState::Closing;
                }
                false
            }
        };

        info!(name = %self.inner.name, code, reason = %reason, "peer close received");
        if closed {
            self.inner.lifecycle.send_replace(Lifecycle::Drained);
        }
        self.inner.listener.on_closing(self, code, &reason);
        if closed {
            info!(name = %self.inner.name, code, reason = %reason, "connection closed");
            self.inner.listener.on_closed(self, code, &reason);
        }
    }
}

/// Resolve once the lifecycle satisfies `done`.
async fn wait_until(lifecycle: &mut watch::Receiver<Lifecycle>, done: impl Fn(Lifecycle) -> bool) {
    loop {
        let current = *lifecycle.borrow_and_update();
        if done(current) {
            return;
        }
        if lifecycle.changed().await.is_err() {
            return;
        }
    }
}

/// Run `work` unless the connection is aborted first.
async fn until_aborted<F>(lifecycle: &mut watch::Receiver<Lifecycle>, work: F)
where
    F: Future<Output = ()>,
{
    tokio::select! {
        biased;
        () = wait_until(lifecycle, |l| l == Lifecycle::Aborted) => {}
        () = work => {}
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
