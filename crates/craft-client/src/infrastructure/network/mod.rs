//! Network infrastructure: the long-lived connection to the game server.
//!
//! Architecture:
//! - [`Connection`] is the caller's handle.  Its methods never block: `send`
//!   and `close` post a command to the driver, subscriptions go straight
//!   into the connection's [`EventBus`].  [`Outbox`] is a cloneable send-only
//!   view of the same connection, for handlers that need to reply.
//! - A single driver task owns the socket, the outbound queue and the
//!   reassembly buffer, and runs the reconnect state machine:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      └──── reconnect delay ◀──┴── fail / end / timeout / error
//!
//! any ──close()──▶ Closed   (terminal)
//! ```
//!
//! - Sends posted while not connected stay queued and are flushed, in order,
//!   as soon as a socket is up.  Every command already waiting in the channel
//!   is queued before a flush starts, so same-turn sends go out as a batch.
//! - A keepalive timer announces the protocol version every
//!   `keepalive_interval` while connected.

mod events;
mod queue;
mod transport;

use std::io;
use std::sync::Arc;
use std::time::Duration;

use craft_core::protocol::{
    decode_message, encode_message, Field, ProtocolError, StreamDecoder, PROTOCOL_VERSION,
    VERSION_COMMAND,
};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::{
        mpsc::{self, error::TryRecvError},
        watch,
    },
    time::{self, Instant, Interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

pub use events::{Event, EventBus, EventName, Handler, SubscriptionId};
pub use queue::OutboundQueue;
pub use transport::{BoxedTransport, Connector, TcpConnector, Transport};

/// Default game server port.
pub const DEFAULT_PORT: u16 = 4080;

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Errors reported through [`Event::Error`].
///
/// None of them are fatal: each one sends the connection down the reconnect
/// path.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The socket could not be established.
    #[error("failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// An I/O error occurred on the established socket.
    #[error("socket error: {0}")]
    Socket(#[source] io::Error),
    /// Nothing was read or written within the inactivity timeout.
    #[error("no socket activity for {0:?}")]
    Timeout(Duration),
    /// A server message could not be parsed.
    #[error("unable to parse server message: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Configuration for one connection.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Game server host name or address.
    pub host: String,
    /// Game server TCP port.
    pub port: u16,
    /// Pause between a lost socket and the next connect attempt.
    pub reconnect_delay: Duration,
    /// Period of the version keepalive and of OS-level TCP keepalive probes.
    pub keepalive_interval: Duration,
    /// Idle time after which a socket is considered dead.
    pub inactivity_timeout: Duration,
    /// Version announced by the keepalive command.
    pub protocol_version: i64,
}

impl ConnectionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Name of the first timing that is zero, if any.
    ///
    /// A zero keepalive period cannot drive a timer, a zero inactivity timeout
    /// drops every socket at once, and a zero reconnect delay retries in a
    /// tight loop.
    pub fn zero_timing(&self) -> Option<&'static str> {
        [
            ("reconnect_delay", self.reconnect_delay),
            ("keepalive_interval", self.keepalive_interval),
            ("inactivity_timeout", self.inactivity_timeout),
        ]
        .into_iter()
        .find(|(_, value)| value.is_zero())
        .map(|(name, _)| name)
    }

    /// Replaces every zero timing with its default.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        Self {
            reconnect_delay: non_zero("reconnect_delay", self.reconnect_delay, defaults.reconnect_delay),
            keepalive_interval: non_zero(
                "keepalive_interval",
                self.keepalive_interval,
                defaults.keepalive_interval,
            ),
            inactivity_timeout: non_zero(
                "inactivity_timeout",
                self.inactivity_timeout,
                defaults.inactivity_timeout,
            ),
            ..self
        }
    }
}

fn non_zero(name: &str, value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        warn!(name, ?fallback, "zero timing in connection config, using default");
        fallback
    } else {
        value
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            reconnect_delay: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(30),
            inactivity_timeout: Duration::from_secs(60),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal.  Entered only through [`Connection::close`] or by dropping
    /// the handle.
    Closed,
}

/// Requests from the handle to the driver task.
#[derive(Debug)]
enum Command {
    Send(Vec<u8>),
    Close,
}

/// Handle to a self-healing connection.
///
/// Created with [`Connection::open`]; must be called from within a Tokio
/// runtime.  Dropping the handle closes the connection.
pub struct Connection {
    outbox: Outbox,
    events: EventBus,
}

/// Cloneable send side of a [`Connection`].
///
/// Handlers can hold one to answer server messages.  Outboxes do not keep the
/// connection open: once the [`Connection`] is closed or dropped, sends are
/// discarded.
#[derive(Clone)]
pub struct Outbox {
    commands: mpsc::UnboundedSender<Command>,
    phase: Arc<watch::Sender<Phase>>,
}

impl Outbox {
    /// Queues `code` with `args` for sending.  Returns immediately.
    ///
    /// The message is written once the connection is up; messages keep their
    /// order across reconnects.  After the connection is closed this does
    /// nothing.
    pub fn send<I>(&self, code: char, args: I)
    where
        I: IntoIterator,
        I::Item: Into<Field>,
    {
        if *self.phase.borrow() == Phase::Closed {
            debug!(%code, "dropping send on closed connection");
            return;
        }
        let fields: Vec<Field> = args.into_iter().map(Into::into).collect();
        let _ = self.commands.send(Command::Send(encode_message(code, &fields)));
    }
}

impl Connection {
    /// Opens a TCP connection to `config.host:config.port` and starts the
    /// driver.  The first connect attempt starts immediately.
    ///
    /// `on_reconnect` is registered before the driver starts, so it sees the
    /// very first connect.
    pub fn open(config: ConnectionConfig, on_reconnect: Option<Handler>) -> Self {
        let config = config.sanitized();
        let connector = Arc::new(TcpConnector::new(Some(config.keepalive_interval)));
        Self::open_with(config, connector, on_reconnect)
    }

    /// Like [`Connection::open`] with a custom [`Connector`].
    ///
    /// Zero timings in `config` are replaced by their defaults.
    pub fn open_with(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        on_reconnect: Option<Handler>,
    ) -> Self {
        let config = config.sanitized();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let events = EventBus::new();
        let phase = Arc::new(watch::Sender::new(Phase::Disconnected));

        if let Some(handler) = on_reconnect {
            events.subscribe(Some(EventName::Reconnect), false, handler);
        }

        let driver_events = events.clone();
        let driver_phase = Arc::clone(&phase);
        tokio::spawn(async move {
            Driver::new(config, connector, driver_events, driver_phase, command_rx)
                .run()
                .await;
        });

        Self {
            outbox: Outbox { commands, phase },
            events,
        }
    }

    /// Queues `code` with `args` for sending.  See [`Outbox::send`].
    pub fn send<I>(&self, code: char, args: I)
    where
        I: IntoIterator,
        I::Item: Into<Field>,
    {
        self.outbox.send(code, args);
    }

    /// A cloneable send-only handle to this connection.
    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    /// Closes the connection for good.
    ///
    /// Takes effect before returning: subscribers are dropped, and no further
    /// events, sends, or connect attempts happen.  Calling it again does
    /// nothing.
    pub fn close(&self) {
        if self.outbox.phase.send_replace(Phase::Closed) == Phase::Closed {
            return;
        }
        self.events.shutdown();
        let _ = self.outbox.commands.send(Command::Close);
        info!("connection closed by caller");
    }

    /// Calls `handler` for every event named `name`.
    pub fn subscribe<F>(&self, name: EventName, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(Some(name), false, Arc::new(handler))
    }

    /// Calls `handler` for the next event named `name` only.
    pub fn subscribe_once<F>(&self, name: EventName, handler: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.events.subscribe(Some(name), true, Arc::new(handler))
    }

    /// Removes a subscription.  Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Returns a channel that receives every event from now on.
    ///
    /// The channel ends when the connection is closed.
    pub fn listen(&self) -> mpsc::UnboundedReceiver<Event> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.events.subscribe(
            None,
            false,
            Arc::new(move |event: &Event| {
                let _ = tx.send(event.clone());
            }),
        );
        rx
    }

    pub fn phase(&self) -> Phase {
        *self.outbox.phase.borrow()
    }

    /// Receiver notified on every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<Phase> {
        self.outbox.phase.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Driver ────────────────────────────────────────────────────────────────────

/// The connection was closed; the driver must stop.
struct Shutdown;

/// Why an established socket was torn down.
enum Teardown {
    RemoteEnd,
    Timeout,
    Failed(ConnectionError),
    /// Parse errors were already emitted while handling the delivery.
    ParseFailure,
    /// `close()` was called while a write was pending.
    Closed,
}

/// Owns everything mutable about a connection.  Runs as one task.
struct Driver {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    events: EventBus,
    phase: Arc<watch::Sender<Phase>>,
    commands: mpsc::UnboundedReceiver<Command>,
    outbound: OutboundQueue,
    inbound: StreamDecoder,
    keepalive: Interval,
}

impl Driver {
    fn new(
        config: ConnectionConfig,
        connector: Arc<dyn Connector>,
        events: EventBus,
        phase: Arc<watch::Sender<Phase>>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let period = config.keepalive_interval;
        let mut keepalive = time::interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self {
            config,
            connector,
            events,
            phase,
            commands,
            outbound: OutboundQueue::new(),
            inbound: StreamDecoder::new(),
            keepalive,
        }
    }

    async fn run(mut self) {
        let _ = self.cycle().await;
        self.shutdown();
    }

    /// Connect, serve, wait, repeat, until closed.
    async fn cycle(&mut self) -> Result<(), Shutdown> {
        loop {
            if let Some(stream) = self.connect().await? {
                self.serve(stream).await?;
            }
            self.wait_before_reconnect().await?;
        }
    }

    async fn connect(&mut self) -> Result<Option<BoxedTransport>, Shutdown> {
        if self.is_closed() {
            return Err(Shutdown);
        }
        self.set_phase(Phase::Connecting);

        let connector = Arc::clone(&self.connector);
        let host = self.config.host.clone();
        let port = self.config.port;
        let limit = self.config.inactivity_timeout;
        debug!(%host, port, "connecting");

        let result = {
            let attempt = time::timeout(limit, connector.connect(&host, port));
            tokio::pin!(attempt);
            loop {
                tokio::select! {
                    result = &mut attempt => break result,
                    command = self.commands.recv() => self.on_command(command)?,
                    _ = self.keepalive.tick() => {}
                }
            }
        };

        match result {
            Ok(Ok(stream)) => Ok(Some(stream)),
            Ok(Err(source)) => {
                warn!(%host, port, error = %source, "failed to connect");
                self.set_phase(Phase::Disconnected);
                self.emit_error(ConnectionError::Connect { host, port, source });
                self.emit(Event::Close);
                Ok(None)
            }
            Err(_) => {
                warn!(%host, port, ?limit, "connect attempt timed out");
                self.set_phase(Phase::Disconnected);
                self.emit(Event::Timeout);
                self.emit(Event::Close);
                Ok(None)
            }
        }
    }

    /// Runs one established socket until it fails.
    async fn serve(&mut self, mut stream: BoxedTransport) -> Result<(), Shutdown> {
        self.inbound.reset();
        self.set_phase(Phase::Connected);
        info!(host = %self.config.host, port = self.config.port, "connected to game server");
        self.emit(Event::Connect);
        self.emit(Event::Reconnect);

        let idle = self.config.inactivity_timeout;
        let mut deadline = Instant::now() + idle;
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        let teardown = loop {
            self.drain_commands()?;
            if let Err(teardown) = self.flush(&mut stream, &mut deadline).await {
                break teardown;
            }

            tokio::select! {
                read = stream.read(&mut buf) => match read {
                    Ok(0) => break Teardown::RemoteEnd,
                    Ok(n) => {
                        deadline = Instant::now() + idle;
                        if !self.on_data(&buf[..n]) {
                            break Teardown::ParseFailure;
                        }
                    }
                    Err(e) => break Teardown::Failed(ConnectionError::Socket(e)),
                },
                command = self.commands.recv() => self.on_command(command)?,
                _ = self.keepalive.tick() => self.announce_version(),
                _ = time::sleep_until(deadline) => break Teardown::Timeout,
            }
        };

        drop(stream);
        if self.is_closed() {
            return Err(Shutdown);
        }
        self.set_phase(Phase::Disconnected);
        match teardown {
            Teardown::RemoteEnd => {
                info!("game server closed the connection");
                self.emit(Event::End);
            }
            Teardown::Timeout => {
                warn!(?idle, "socket inactive, dropping it");
                self.emit(Event::Timeout);
            }
            Teardown::Failed(error) => {
                warn!(%error, "socket error");
                self.emit_error(error);
            }
            Teardown::ParseFailure => {
                debug!("dropping socket after unparsable server message");
            }
            Teardown::Closed => return Err(Shutdown),
        }
        self.emit(Event::Close);
        Ok(())
    }

    async fn wait_before_reconnect(&mut self) -> Result<(), Shutdown> {
        let delay = self.config.reconnect_delay;
        info!(?delay, "reconnect scheduled");
        let wake = time::sleep(delay);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                _ = &mut wake => return Ok(()),
                command = self.commands.recv() => self.on_command(command)?,
                _ = self.keepalive.tick() => {}
            }
        }
    }

    /// Writes queued messages in order.  A message leaves the queue only once
    /// it is fully written.
    ///
    /// Gives up on the socket as soon as the connection is closed, even when
    /// a write is stalled on a peer that does not read.
    async fn flush(
        &mut self,
        stream: &mut BoxedTransport,
        deadline: &mut Instant,
    ) -> Result<(), Teardown> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        let idle = self.config.inactivity_timeout;
        let mut phase = self.phase.subscribe();
        let mut written = 0usize;

        while let Some(bytes) = self.outbound.front() {
            let outcome = tokio::select! {
                result = time::timeout(idle, stream.write_all(bytes)) => result,
                _ = until_closed(&mut phase) => return Err(Teardown::Closed),
            };
            match outcome {
                Ok(Ok(())) => {
                    self.outbound.pop();
                    written += 1;
                    *deadline = Instant::now() + idle;
                }
                Ok(Err(e)) => return Err(Teardown::Failed(ConnectionError::Socket(e))),
                Err(_) => return Err(Teardown::Timeout),
            }
        }

        let outcome = tokio::select! {
            result = time::timeout(idle, stream.flush()) => result,
            _ = until_closed(&mut phase) => return Err(Teardown::Closed),
        };
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(Teardown::Failed(ConnectionError::Socket(e))),
            Err(_) => return Err(Teardown::Timeout),
        }
        debug!(written, "outbound queue flushed");
        self.emit(Event::Drain);
        Ok(())
    }

    /// Publishes one delivery.  Returns `false` if any message failed to parse.
    fn on_data(&mut self, bytes: &[u8]) -> bool {
        if self.is_closed() {
            return true;
        }
        self.emit(Event::Data(bytes.to_vec()));

        let mut clean = true;
        for line in self.inbound.decode(bytes) {
            match decode_message(&line) {
                Ok(message) => {
                    self.emit(Event::Command(message));
                }
                Err(error) => {
                    warn!(%error, "unable to parse server message");
                    self.emit_error(ConnectionError::Protocol(error));
                    clean = false;
                }
            }
        }
        clean
    }

    fn on_command(&mut self, command: Option<Command>) -> Result<(), Shutdown> {
        match command {
            Some(Command::Send(bytes)) => {
                self.outbound.push(bytes);
                Ok(())
            }
            Some(Command::Close) | None => Err(Shutdown),
        }
    }

    /// Queues every command already waiting, so same-turn sends flush together.
    fn drain_commands(&mut self) -> Result<(), Shutdown> {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.on_command(Some(command))?,
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => return Err(Shutdown),
            }
        }
    }

    fn announce_version(&mut self) {
        if self.phase() != Phase::Connected {
            return;
        }
        debug!(version = self.config.protocol_version, "keepalive");
        self.outbound.push(encode_message(
            VERSION_COMMAND,
            &[Field::Integer(self.config.protocol_version)],
        ));
    }

    fn shutdown(&mut self) {
        self.phase.send_replace(Phase::Closed);
        self.events.shutdown();
        let discarded = self.outbound.len();
        self.outbound.clear();
        self.inbound.reset();
        debug!(discarded, "connection driver stopped");
    }

    fn emit(&self, event: Event) {
        self.events.emit(&event);
    }

    fn emit_error(&self, error: ConnectionError) {
        self.emit(Event::Error(Arc::new(error)));
    }

    fn set_phase(&self, next: Phase) {
        self.phase.send_if_modified(|current| {
            if *current == Phase::Closed || *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }
}

/// Resolves once the phase is `Closed`.
async fn until_closed(phase: &mut watch::Receiver<Phase>) {
    let _ = phase.wait_for(|p| *p == Phase::Closed).await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────
