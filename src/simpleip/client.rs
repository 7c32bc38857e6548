use crate::prelude::*;
use crate::simpleip::codec::{self, SimpleIpCodec};
use crate::simpleip::listener::{ListenerId, ListenerSet, SimpleIpListener};
use crate::simpleip::message::{Command, Message, MessageType, Parameter};

use bytes::BytesMut;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::codec::{Decoder, Encoder};

/// Default Simple IP port.
pub const DEFAULT_PORT: u16 = 20060;

const READ_BUFFER_SIZE: usize = 1024;
const MAX_BUFFER_SIZE: usize = 8192;

/// Timing and policy knobs for a [`SimpleIpClient`].
#[derive(Clone, Debug)]
pub struct ClientSettings {
    /// Bound on a single TCP connect attempt.
    pub connect_timeout: Duration,
    /// Delay before the first liveness probe after a connect.
    pub keepalive_initial_delay: Duration,
    /// Period of the liveness probe; no traffic for this interval plus
    /// [`read_timeout_slack`](Self::read_timeout_slack) means the link is dead.
    pub supervision_interval: Duration,
    pub read_timeout_slack: Duration,
    /// Consecutive failures tolerated at the fast delay before falling back
    /// to the slow one.
    pub fast_retry_count: u32,
    pub fast_retry_delay: Duration,
    pub slow_retry_delay: Duration,
    /// Whether an unrecognized message/command code tears the link down
    /// (historic behavior) or just discards that frame.
    pub reconnect_on_decode_error: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(5000),
            keepalive_initial_delay: Duration::from_millis(5000),
            supervision_interval: Duration::from_millis(60000),
            read_timeout_slack: Duration::from_millis(10000),
            fast_retry_count: 3,
            fast_retry_delay: Duration::from_millis(1000),
            slow_retry_delay: Duration::from_millis(60000),
            reconnect_on_decode_error: true,
        }
    }
}

impl ClientSettings {
    /// How long a read may go without a frame before the peer is presumed dead.
    pub fn read_timeout(&self) -> Duration {
        self.supervision_interval + self.read_timeout_slack
    }
}

enum ConnectionState {
    Disconnected,
    Connecting,
    Connected(Link),
}

/// The write side of a live connection plus its supervisor. The read side is
/// owned by the receive worker spawned alongside it.
struct Link {
    writer: OwnedWriteHalf,
    keepalive: JoinHandle<()>,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LinkFailure {
    /// Read timeout elapsed without a frame; reconnect immediately.
    Silent,
    Io,
    Decode,
}

enum Reconnect {
    Resumed,
    Failed,
    Stop,
}

/// A long-lived, auto-reconnecting Simple IP connection to one device.
///
/// Cheap to clone; all clones share the same connection. The client is opened
/// once, may reconnect internally any number of times, and is closed exactly
/// once, after which it refuses further use.
#[derive(Clone)]
pub struct SimpleIpClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    peer: String,
    settings: ClientSettings,
    listeners: ListenerSet,
    /// All state transitions happen under this lock, so open/close/reconnect
    /// never interleave and a write never races a teardown.
    state: tokio::sync::Mutex<ConnectionState>,
    /// Handle of the current receive worker, for close() to await.
    receiver: std::sync::Mutex<Option<JoinHandle<()>>>,
    /// Bumped on every successful connect; lets a worker for a superseded
    /// link notice it is stale and bow out.
    generation: AtomicU64,
    /// Shared across reconnects so escalation survives a failed reopen.
    consecutive_failures: AtomicU32,
    /// Fired once, by close().
    shutdown: broadcast::Sender<()>,
    closed: AtomicBool,
}

impl SimpleIpClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self::with_settings(host, port, ClientSettings::default())
    }

    pub fn with_settings(host: &str, port: u16, settings: ClientSettings) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(ClientInner {
                peer: format!("{}:{}", host, port),
                settings,
                listeners: ListenerSet::new(),
                state: tokio::sync::Mutex::new(ConnectionState::Disconnected),
                receiver: std::sync::Mutex::new(None),
                generation: AtomicU64::new(0),
                consecutive_failures: AtomicU32::new(0),
                shutdown,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// `host:port` of the device, as passed to listener callbacks.
    pub fn peer(&self) -> &str {
        &self.inner.peer
    }

    pub fn add_listener(&self, listener: Arc<dyn SimpleIpListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    pub async fn is_connected(&self) -> bool {
        matches!(
            &*self.inner.state.lock().await,
            ConnectionState::Connected(_)
        )
    }

    /// Connect if not already connected. Idempotent. A connect failure is
    /// reported through `on_connection_error` as well as the returned error.
    pub async fn open(&self) -> Result<()> {
        self.inner.ensure_usable()?;
        let mut state = self.inner.state.lock().await;
        if matches!(&*state, ConnectionState::Connected(_)) {
            return Ok(());
        }
        self.inner.establish(&mut state).await
    }

    /// Send an enquiry (no parameter) for the given command.
    pub async fn enquire(&self, command: Command) -> Result<()> {
        self.inner.send_message(Message::enquiry(command)).await
    }

    /// Send a control command with the given parameter.
    pub async fn control(&self, command: Command, parameter: Parameter) -> Result<()> {
        self.inner
            .send_message(Message::new(MessageType::Control, command, parameter))
            .await
    }

    /// Send an arbitrary pre-built message, connecting first if necessary.
    pub async fn send(&self, message: Message) -> Result<()> {
        self.inner.send_message(message).await
    }

    /// Stop the keepalive supervisor and the receive worker, close the
    /// socket, and refuse further use. Safe to call more than once and from
    /// any task.
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("closing connection to {}", self.inner.peer);

        let _ = self.inner.shutdown.send(());
        let receiver = {
            let mut state = self.inner.state.lock().await;
            self.inner.teardown_locked(&mut state);
            self.inner.take_receiver()
        };

        if let Some(receiver) = receiver {
            if let Err(e) = receiver.await {
                if !e.is_cancelled() {
                    warn!("receive worker for {} ended badly: {}", self.inner.peer, e);
                }
            }
        }
    }
}

impl ClientInner {
    fn ensure_usable(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            bail!("client for {} has been closed", self.peer);
        }
        Ok(())
    }

    fn take_receiver(&self) -> Option<JoinHandle<()>> {
        match self.receiver.lock() {
            Ok(mut receiver) => receiver.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn store_receiver(&self, handle: JoinHandle<()>) {
        match self.receiver.lock() {
            Ok(mut receiver) => *receiver = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }
    }

    /// Connect and bring up the per-link workers. Must be called with the
    /// state lock held and no live link in place.
    async fn establish(self: &Arc<Self>, state: &mut ConnectionState) -> Result<()> {
        // close() may have landed while a send retry or open() was waiting
        // for the lock; a closed client must stay down
        self.ensure_usable()?;
        *state = ConnectionState::Connecting;
        debug!("connecting to {}", self.peer);

        let connect = TcpStream::connect(self.peer.as_str());
        let stream = match tokio::time::timeout(self.settings.connect_timeout, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                *state = ConnectionState::Disconnected;
                let reason = format!("connect failed: {}", e);
                self.listeners.dispatch_connection_error(&self.peer, &reason);
                bail!("connect to {} failed: {}", self.peer, e);
            }
            Err(_) => {
                *state = ConnectionState::Disconnected;
                let reason = format!(
                    "connect timed out after {}ms",
                    self.settings.connect_timeout.as_millis()
                );
                self.listeners.dispatch_connection_error(&self.peer, &reason);
                bail!("connect to {} timed out", self.peer);
            }
        };

        let (reader, writer) = stream.into_split();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let keepalive = self.spawn_keepalive();
        *state = ConnectionState::Connected(Link { writer, keepalive });
        info!("connected to {}", self.peer);

        let inner = Arc::clone(self);
        let receiver = tokio::spawn(inner.receive_loop(reader, generation));
        self.store_receiver(receiver);

        Ok(())
    }

    /// Drop the current link, if any. The keepalive supervisor is stopped
    /// before the socket so a probe can never race the close.
    fn teardown_locked(&self, state: &mut ConnectionState) {
        if let ConnectionState::Connected(link) =
            std::mem::replace(state, ConnectionState::Disconnected)
        {
            link.keepalive.abort();
            drop(link.writer);
        }
    }

    /// Serialize and write one message, connecting first if necessary.
    ///
    /// A write failure closes the socket and retries with a fresh connection,
    /// up to the fast retry budget; when that is exhausted, exactly one
    /// connection error event fires for the whole call.
    async fn send_message(self: &Arc<Self>, message: Message) -> Result<()> {
        self.ensure_usable()?;

        let mut frame = BytesMut::with_capacity(codec::FRAME_LEN);
        SimpleIpCodec::new().encode(message, &mut frame)?;

        let mut retries_left = self.settings.fast_retry_count;
        loop {
            let mut state = self.state.lock().await;
            if !matches!(&*state, ConnectionState::Connected(_)) {
                // establish reports its own failure; one event per call
                self.establish(&mut state).await?;
            }
            let ConnectionState::Connected(link) = &mut *state else {
                bail!("connection to {} not available", self.peer);
            };

            debug!("sending {} to {}", message, self.peer);
            let written = async {
                link.writer.write_all(&frame).await?;
                link.writer.flush().await
            }
            .await;

            match written {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("write to {} failed: {}", self.peer, e);
                    self.teardown_locked(&mut state);
                    drop(state);

                    if retries_left == 0 {
                        let reason = format!(
                            "write failed after {} retries: {}",
                            self.settings.fast_retry_count, e
                        );
                        self.listeners.dispatch_connection_error(&self.peer, &reason);
                        bail!("write to {} failed after retries: {}", self.peer, e);
                    }
                    retries_left -= 1;
                    tokio::time::sleep(self.settings.fast_retry_delay).await;
                }
            }
        }
    }

    /// The keepalive supervisor: probes the device on a fixed period so an
    /// idle link produces traffic ahead of the read timeout. Aborted during
    /// teardown, always before the socket goes away.
    fn spawn_keepalive(self: &Arc<Self>) -> JoinHandle<()> {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(inner.settings.keepalive_initial_delay).await;
            let mut ticker = tokio::time::interval(inner.settings.supervision_interval);
            loop {
                // first tick completes immediately, right after the initial delay
                ticker.tick().await;
                debug!("sending liveness probe to {}", inner.peer);
                if let Err(e) = inner.send_message(Message::enquiry(Command::PowerStatus)).await {
                    warn!("liveness probe to {} failed: {}", inner.peer, e);
                }
            }
        })
    }

    /// One receive worker runs per link. It decodes frames and dispatches
    /// them in order; on any link failure it backs off, reconnects, and hands
    /// the new socket to the replacement worker spawned by establish().
    ///
    /// Boxed: the worker respawns itself through reconnect/establish, which
    /// would otherwise make the future type infinitely recursive.
    fn receive_loop(
        self: Arc<Self>,
        mut reader: OwnedReadHalf,
        generation: u64,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut shutdown = self.shutdown.subscribe();
            // the shutdown signal may have fired between spawn and subscribe
            if self.closed.load(Ordering::SeqCst) {
                return;
            }
            let mut codec = SimpleIpCodec::new();
            let mut buf = BytesMut::with_capacity(READ_BUFFER_SIZE);
            let read_timeout = self.settings.read_timeout();
            debug!("receive worker for {} running", self.peer);

            let mut pending: Option<LinkFailure> = None;
            loop {
                let failure = match pending.take() {
                    Some(failure) => failure,
                    None => {
                        if buf.len() > MAX_BUFFER_SIZE {
                            warn!(
                                "over {} buffered bytes from {} without a frame, discarding",
                                MAX_BUFFER_SIZE, self.peer
                            );
                            buf.clear();
                        }

                        tokio::select! {
                            _ = shutdown.recv() => {
                                debug!("receive worker for {} stopping", self.peer);
                                return;
                            }
                            result = tokio::time::timeout(read_timeout, reader.read_buf(&mut buf)) => match result {
                                Err(_) => {
                                    warn!(
                                        "no data from {} for {}ms, presuming link dead",
                                        self.peer,
                                        read_timeout.as_millis()
                                    );
                                    LinkFailure::Silent
                                }
                                Ok(Err(e)) => {
                                    warn!("read from {} failed: {}", self.peer, e);
                                    LinkFailure::Io
                                }
                                Ok(Ok(0)) => {
                                    info!("connection closed by {}", self.peer);
                                    LinkFailure::Io
                                }
                                Ok(Ok(_)) => match self.drain_frames(&mut codec, &mut buf) {
                                    Ok(()) => continue,
                                    Err(e) => {
                                        warn!("unusable frame from {}: {}", self.peer, e);
                                        LinkFailure::Decode
                                    }
                                },
                            }
                        }
                    }
                };

                // A silent link reconnects immediately; everything else backs off
                // first so a permanently broken peer is not busy-looped against.
                if failure != LinkFailure::Silent && !self.backoff(&mut shutdown).await {
                    return;
                }

                match self.reconnect(generation).await {
                    Reconnect::Resumed => {
                        // The replacement worker owns the new socket. Probe it
                        // before bowing out so a dead reopen is caught early.
                        if let Err(e) = self
                            .send_message(Message::enquiry(Command::PowerStatus))
                            .await
                        {
                            warn!("post-reconnect probe to {} failed: {}", self.peer, e);
                        }
                        return;
                    }
                    Reconnect::Failed => pending = Some(LinkFailure::Io),
                    Reconnect::Stop => return,
                }
            }
        })
    }

    /// Decode and dispatch everything buffered so far. Depending on policy an
    /// undecodable frame either surfaces (tearing the link down) or is
    /// dropped on the spot.
    fn drain_frames(&self, codec: &mut SimpleIpCodec, buf: &mut BytesMut) -> Result<()> {
        loop {
            match codec.decode(buf) {
                Ok(Some(message)) => {
                    debug!("received {} from {}", message, self.peer);
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.listeners.dispatch_message(&self.peer, &message);
                }
                Ok(None) => return Ok(()),
                Err(e) => {
                    if self.settings.reconnect_on_decode_error {
                        return Err(e);
                    }
                    warn!("discarding undecodable frame from {}: {}", self.peer, e);
                }
            }
        }
    }

    /// Returns false if shutdown was signalled during the wait.
    async fn backoff(&self, shutdown: &mut broadcast::Receiver<()>) -> bool {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = if failures <= self.settings.fast_retry_count {
            self.settings.fast_retry_delay
        } else {
            self.settings.slow_retry_delay
        };
        debug!(
            "waiting {}ms before retrying {} (consecutive failure #{})",
            delay.as_millis(),
            self.peer,
            failures
        );
        tokio::select! {
            _ = shutdown.recv() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    /// Tear down the failed link and bring up a fresh one. Called only from
    /// the receive worker that owned the link.
    async fn reconnect(self: &Arc<Self>, generation: u64) -> Reconnect {
        if self.closed.load(Ordering::SeqCst) {
            return Reconnect::Stop;
        }

        let mut state = self.state.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            return Reconnect::Stop;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            // someone else (a send retry) already rebuilt the link and its
            // worker; this one is stale
            debug!("receive worker for superseded link to {} exiting", self.peer);
            return Reconnect::Stop;
        }

        self.teardown_locked(&mut state);
        match self.establish(&mut state).await {
            Ok(()) => Reconnect::Resumed,
            Err(e) => {
                debug!("reconnect to {} failed: {}", self.peer, e);
                Reconnect::Failed
            }
        }
    }
}
