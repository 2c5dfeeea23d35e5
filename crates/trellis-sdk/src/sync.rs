//! Sync transport adapter.
//!
//! One [`SyncAdapter`] per session owns the connection to a room. It keeps an
//! outbox of encoded local operations, reconnects with exponential backoff
//! and, on every successful connection:
//!
//! 1. announces itself with `Hello`,
//! 2. asks peers for what it missed (`SyncRequest` with its cursor),
//! 3. replays every operation the relay has not acknowledged yet.
//!
//! Peers answer both `Hello` and `SyncRequest` with whatever the sender's
//! cursor lacks. Receivers deduplicate, so replaying is always safe. Transport failures
//! never reach callers as errors; they show up as [`SyncStatus`] changes.

use crate::error::Result;
use crate::network::{Connection, Envelope, Message, NetworkError, PeerId, Transport};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Notify};
use tokio::task::JoinHandle;
use trellis_core::{SeqNo, VersionVector};
use trellis_oplog::{codec, Operation};

/// Configuration for sync behavior.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// First reconnect delay (in milliseconds).
    pub backoff_base_ms: u64,
    /// Upper bound for the reconnect delay (in milliseconds).
    pub backoff_max_ms: u64,
    /// Add random jitter to reconnect delays.
    pub jitter: bool,
    /// Consecutive failed attempts before giving up. `None` retries forever.
    pub max_retries: Option<u32>,
    /// Capacity of the status broadcast channel.
    pub channel_capacity: usize,
    /// Ask peers for missed operations on every connection.
    pub catch_up_on_connect: bool,
}

impl SyncConfig {
    fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
        )
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 100,
            backoff_max_ms: 10_000,
            jitter: true,
            max_retries: None,
            channel_capacity: 100,
            catch_up_on_connect: true,
        }
    }
}

/// Builder for sync configuration.
pub struct SyncConfigBuilder {
    config: SyncConfig,
}

impl SyncConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.config.backoff_base_ms = base_ms;
        self.config.backoff_max_ms = max_ms;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.config.jitter = enabled;
        self
    }

    pub fn max_retries(mut self, retries: Option<u32>) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn catch_up_on_connect(mut self, enabled: bool) -> Self {
        self.config.catch_up_on_connect = enabled;
        self
    }

    pub fn build(self) -> SyncConfig {
        self.config
    }
}

impl Default for SyncConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Connection state of one adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Inputs of the connection state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Open,
    Established,
    Failed,
    Lost,
    Close,
}

impl ConnectionState {
    /// The state after `event`, or `None` if the transition is not allowed.
    pub fn on(self, event: ConnectionEvent) -> Option<ConnectionState> {
        match (self, event) {
            (ConnectionState::Disconnected, ConnectionEvent::Open) => Some(ConnectionState::Connecting),
            (ConnectionState::Connecting, ConnectionEvent::Established) => {
                Some(ConnectionState::Connected)
            }
            (ConnectionState::Connecting, ConnectionEvent::Failed) => Some(ConnectionState::Disconnected),
            (ConnectionState::Connected, ConnectionEvent::Lost) => Some(ConnectionState::Disconnected),
            (_, ConnectionEvent::Close) => Some(ConnectionState::Disconnected),
            _ => None,
        }
    }
}

/// Sync status reported to subscribers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncStatus {
    /// Not connected; local edits are queued.
    Offline,
    Connecting,
    Online,
    /// Retries are exhausted. Local edits are still accepted and queued.
    Unavailable,
}

impl From<ConnectionState> for SyncStatus {
    fn from(state: ConnectionState) -> Self {
        match state {
            ConnectionState::Disconnected => SyncStatus::Offline,
            ConnectionState::Connecting => SyncStatus::Connecting,
            ConnectionState::Connected => SyncStatus::Online,
        }
    }
}

/// Exponential reconnect delay.
#[derive(Clone, Debug)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        let next = self.current.checked_mul(2).unwrap_or(self.max);
        self.current = std::cmp::min(next, self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// Add up to half of `delay` at random.
fn jittered(delay: Duration) -> Duration {
    let ms = delay.as_millis() as u64;
    if ms < 2 {
        return delay;
    }
    delay + Duration::from_millis(rand::thread_rng().gen_range(0..=ms / 2))
}

/// Receiver of remote operations and source of catch-up answers.
pub trait OperationSink: Send + Sync + 'static {
    /// Merge one remote operation. Called in arrival order.
    fn receive(&self, op: Operation);

    /// Contiguous frontier of everything applied so far.
    fn cursor(&self) -> VersionVector;

    /// Operations a peer at `cursor` is missing.
    fn operations_since(&self, cursor: &VersionVector) -> Vec<Operation>;

    fn status_changed(&self, _status: SyncStatus) {}
}

/// Encoded local operations not yet acknowledged by the relay.
#[derive(Debug, Default)]
struct Outbox {
    entries: VecDeque<(SeqNo, Vec<u8>)>,
    /// Highest sequence number sent on the current connection.
    sent_upto: SeqNo,
}

impl Outbox {
    fn push(&mut self, seq: SeqNo, bytes: Vec<u8>) {
        self.entries.push_back((seq, bytes));
    }

    fn ack(&mut self, upto: SeqNo) {
        while self.entries.front().is_some_and(|(seq, _)| *seq <= upto) {
            self.entries.pop_front();
        }
    }

    /// Forget what was sent so the next flush replays everything.
    fn rewind(&mut self) {
        self.sent_upto = 0;
    }

    fn take_unsent(&mut self) -> Option<(Vec<Vec<u8>>, SeqNo)> {
        let unsent: Vec<_> = self
            .entries
            .iter()
            .filter(|(seq, _)| *seq > self.sent_upto)
            .collect();
        let last = unsent.last().map(|(seq, _)| *seq)?;
        let frames = unsent.into_iter().map(|(_, bytes)| bytes.clone()).collect();
        self.sent_upto = last;
        Some((frames, last))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

enum SessionEnd {
    Shutdown,
    Lost,
}

/// State shared between an adapter and its driver task.
struct Shared {
    peer: PeerId,
    user_name: String,
    room_id: String,
    transport: Arc<dyn Transport>,
    config: SyncConfig,
    state: RwLock<ConnectionState>,
    status: RwLock<SyncStatus>,
    status_tx: broadcast::Sender<SyncStatus>,
    outbox: Mutex<Outbox>,
    wake: Notify,
    sink: RwLock<Option<Weak<dyn OperationSink>>>,
}

impl Shared {
    fn sink(&self) -> Option<Arc<dyn OperationSink>> {
        self.sink.read().as_ref().and_then(Weak::upgrade)
    }

    fn transition(&self, event: ConnectionEvent) {
        let (from, to) = {
            let mut state = self.state.write();
            let from = *state;
            match from.on(event) {
                Some(to) => {
                    *state = to;
                    (from, to)
                }
                None => {
                    tracing::warn!(peer = %self.peer, ?from, ?event, "rejected connection transition");
                    return;
                }
            }
        };
        if from != to {
            tracing::debug!(peer = %self.peer, room = %self.room_id, ?from, ?to, "connection state changed");
            self.publish(to.into());
        }
    }

    fn publish(&self, status: SyncStatus) {
        *self.status.write() = status;
        let _ = self.status_tx.send(status);
        if let Some(sink) = self.sink() {
            sink.status_changed(status);
        }
    }

    async fn pump(&self, connection: Connection, shutdown: &mut watch::Receiver<bool>) -> SessionEnd {
        let Connection {
            outgoing,
            mut incoming,
        } = connection;

        let cursor = self.sink().map(|s| s.cursor()).unwrap_or_default();
        let hello = Message::Hello {
            client_id: self.peer.0.clone(),
            user_name: self.user_name.clone(),
            cursor: cursor.clone(),
        };
        if outgoing.send(hello).await.is_err() {
            return SessionEnd::Lost;
        }
        if self.config.catch_up_on_connect
            && outgoing.send(Message::SyncRequest { cursor }).await.is_err()
        {
            return SessionEnd::Lost;
        }

        self.outbox.lock().rewind();
        if self.flush(&outgoing).await.is_err() {
            return SessionEnd::Lost;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => return SessionEnd::Shutdown,
                _ = self.wake.notified() => {
                    if self.flush(&outgoing).await.is_err() {
                        return SessionEnd::Lost;
                    }
                }
                envelope = incoming.recv() => match envelope {
                    Some(envelope) => {
                        if self.handle(envelope, &outgoing).await.is_err() {
                            return SessionEnd::Lost;
                        }
                    }
                    None => return SessionEnd::Lost,
                },
            }
        }
    }

    async fn flush(&self, outgoing: &mpsc::Sender<Message>) -> std::result::Result<(), NetworkError> {
        let batch = self.outbox.lock().take_unsent();
        if let Some((operations, last_seq)) = batch {
            tracing::debug!(peer = %self.peer, count = operations.len(), last_seq, "sending operations");
            outgoing
                .send(Message::Operations {
                    operations,
                    last_seq,
                })
                .await
                .map_err(|_| NetworkError::Disconnected)?;
        }
        Ok(())
    }

    async fn handle(
        &self,
        envelope: Envelope,
        outgoing: &mpsc::Sender<Message>,
    ) -> std::result::Result<(), NetworkError> {
        match envelope.message {
            Message::Hello {
                client_id,
                user_name,
                cursor,
            } => {
                tracing::debug!(peer = %self.peer, remote = %client_id, user = %user_name, "peer joined room");
                self.catch_up(envelope.from, &cursor, outgoing).await?;
            }
            Message::SyncRequest { cursor } => {
                self.catch_up(envelope.from, &cursor, outgoing).await?;
            }
            Message::SyncResponse { operations, .. } | Message::Operations { operations, .. } => {
                self.deliver(&envelope.from, &operations);
            }
            Message::Ack { upto } => {
                self.outbox.lock().ack(upto);
            }
        }
        Ok(())
    }

    /// Send `to` every operation it is missing according to `cursor`.
    async fn catch_up(
        &self,
        to: PeerId,
        cursor: &VersionVector,
        outgoing: &mpsc::Sender<Message>,
    ) -> std::result::Result<(), NetworkError> {
        let Some(sink) = self.sink() else {
            return Ok(());
        };
        let operations: Vec<Vec<u8>> = sink
            .operations_since(cursor)
            .iter()
            .filter_map(|op| match codec::encode(op) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    tracing::warn!(op = %op.id(), error = %e, "skipping unencodable operation");
                    None
                }
            })
            .collect();
        if operations.is_empty() {
            return Ok(());
        }
        tracing::debug!(peer = %self.peer, to = %to, count = operations.len(), "sending catch-up");
        outgoing
            .send(Message::SyncResponse { to, operations })
            .await
            .map_err(|_| NetworkError::Disconnected)
    }

    fn deliver(&self, from: &PeerId, frames: &[Vec<u8>]) {
        let Some(sink) = self.sink() else {
            tracing::warn!(peer = %self.peer, count = frames.len(), "no receiver installed, dropping operations");
            return;
        };
        for frame in frames {
            match codec::decode(frame) {
                Ok(op) => sink.receive(op),
                Err(e) => tracing::warn!(peer = %self.peer, from = %from, error = %e, "dropping malformed operation"),
            }
        }
    }
}

async fn drive(shared: Arc<Shared>, mut shutdown: watch::Receiver<bool>) {
    let mut backoff = shared.config.backoff();
    let mut failures: u32 = 0;

    loop {
        shared.transition(ConnectionEvent::Open);
        let opened = tokio::select! {
            _ = shutdown.changed() => break,
            opened = shared.transport.open(&shared.room_id, &shared.peer) => opened,
        };

        match opened {
            Ok(connection) => {
                shared.transition(ConnectionEvent::Established);
                backoff.reset();
                failures = 0;
                match shared.pump(connection, &mut shutdown).await {
                    SessionEnd::Shutdown => break,
                    SessionEnd::Lost => {
                        tracing::warn!(peer = %shared.peer, room = %shared.room_id, "connection lost");
                        shared.transition(ConnectionEvent::Lost);
                    }
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!(peer = %shared.peer, attempt = failures, error = %e, "connection attempt failed");
                shared.transition(ConnectionEvent::Failed);
                if shared.config.max_retries.is_some_and(|max| failures >= max) {
                    tracing::warn!(peer = %shared.peer, room = %shared.room_id, "giving up, room unavailable");
                    shared.publish(SyncStatus::Unavailable);
                    return;
                }
            }
        }

        let delay = backoff.next_delay();
        let delay = if shared.config.jitter { jittered(delay) } else { delay };
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.transition(ConnectionEvent::Close);
}

/// Reconnect-safe delivery of operations for one session.
pub struct SyncAdapter {
    shared: Arc<Shared>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl SyncAdapter {
    pub fn new(
        peer: PeerId,
        user_name: impl Into<String>,
        room_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        config: SyncConfig,
    ) -> Self {
        let (status_tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                peer,
                user_name: user_name.into(),
                room_id: room_id.into(),
                transport,
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                status: RwLock::new(SyncStatus::Offline),
                status_tx,
                outbox: Mutex::new(Outbox::default()),
                wake: Notify::new(),
                sink: RwLock::new(None),
            }),
            shutdown: Mutex::new(None),
            driver: Mutex::new(None),
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.shared.peer
    }

    pub fn room_id(&self) -> &str {
        &self.shared.room_id
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Install the receiver of remote operations.
    ///
    /// Only a weak reference is kept; the adapter stops delivering once the
    /// sink is dropped.
    pub fn on_receive(&self, sink: Arc<dyn OperationSink>) {
        *self.shared.sink.write() = Some(Arc::downgrade(&sink));
    }

    /// Start the driver task. Does nothing if it is already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let mut driver = self.driver.lock();
        if driver.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let (tx, rx) = watch::channel(false);
        *self.shutdown.lock() = Some(tx);
        *driver = Some(tokio::spawn(drive(self.shared.clone(), rx)));
    }

    /// Queue a local operation. It is sent now if connected, otherwise on
    /// the next successful connection.
    pub fn send(&self, op: &Operation) -> Result<()> {
        let bytes = codec::encode(op)?;
        self.shared.outbox.lock().push(op.seq, bytes);
        self.shared.wake.notify_one();
        Ok(())
    }

    /// Stop the driver and cancel pending retries.
    ///
    /// Unacknowledged operations stay queued and are replayed by the next
    /// [`connect`](Self::connect).
    pub async fn disconnect(&self) {
        let shutdown = self.shutdown.lock().take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        let driver = self.driver.lock().take();
        if let Some(handle) = driver {
            let _ = handle.await;
        }
        self.shared.outbox.lock().rewind();
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.read()
    }

    pub fn status(&self) -> SyncStatus {
        *self.shared.status.read()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.shared.status_tx.subscribe()
    }

    /// Number of local operations not yet acknowledged.
    pub fn pending(&self) -> usize {
        self.shared.outbox.lock().len()
    }
}
