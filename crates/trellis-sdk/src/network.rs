//! Network transport abstractions for Trellis synchronization.
//!
//! A [`Transport`] opens one [`Connection`] per session: a pair of channels,
//! outgoing [`Message`]s and incoming [`Envelope`]s. Everything above it
//! (retry, replay, catch-up) lives in [`crate::sync`].

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use trellis_core::{SeqNo, VersionVector};

/// Unique identifier for a peer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerId(pub String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages exchanged through a room. Operations travel as encoded blobs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Announce a (re)connected peer.
    Hello {
        client_id: String,
        user_name: String,
        cursor: VersionVector,
    },
    /// Ask peers for every operation past `cursor`.
    SyncRequest { cursor: VersionVector },
    /// Catch-up answer addressed to one peer.
    SyncResponse {
        to: PeerId,
        operations: Vec<Vec<u8>>,
    },
    /// Local operations, up to and including sequence number `last_seq`.
    Operations {
        operations: Vec<Vec<u8>>,
        last_seq: SeqNo,
    },
    /// The relay has handed off the sender's operations up to `upto`.
    Ack { upto: SeqNo },
}

/// A message together with the peer it came from.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub from: PeerId,
    pub message: Message,
}

/// Network error type.
#[derive(Error, Clone, Debug, PartialEq)]
pub enum NetworkError {
    #[error("peer unreachable: {0}")]
    Unreachable(PeerId),

    #[error("disconnected")]
    Disconnected,
}

/// An open connection to a room.
pub struct Connection {
    pub outgoing: mpsc::Sender<Message>,
    pub incoming: mpsc::Receiver<Envelope>,
}

/// Abstract network transport trait.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `room_id` as `peer`.
    async fn open(&self, room_id: &str, peer: &PeerId) -> Result<Connection, NetworkError>;
}

const RELAY_ID: &str = "relay";

struct RelayPeer {
    inbox: mpsc::Sender<Envelope>,
    generation: u64,
}

struct RelayState {
    rooms: HashMap<String, HashMap<PeerId, RelayPeer>>,
    offline: HashSet<PeerId>,
    online: bool,
    next_generation: u64,
}

impl RelayState {
    fn is_current(&self, room_id: &str, peer: &PeerId, generation: u64) -> bool {
        self.rooms
            .get(room_id)
            .and_then(|peers| peers.get(peer))
            .is_some_and(|p| p.generation == generation)
    }

    /// Inboxes a message from `from` is delivered to.
    fn targets(&self, room_id: &str, from: &PeerId, message: &Message) -> Vec<mpsc::Sender<Envelope>> {
        let Some(peers) = self.rooms.get(room_id) else {
            return Vec::new();
        };
        match message {
            Message::SyncResponse { to, .. } => {
                peers.get(to).map(|p| p.inbox.clone()).into_iter().collect()
            }
            Message::Ack { .. } => Vec::new(),
            _ => peers
                .iter()
                .filter(|(id, _)| *id != from)
                .map(|(_, p)| p.inbox.clone())
                .collect(),
        }
    }
}

/// In-process relay for testing and simulation.
///
/// Routes messages between the peers of a room, acknowledges handed-off
/// operations back to their sender and supports fault injection: taking the
/// whole relay or a single peer offline, and kicking a peer's connection.
#[derive(Clone)]
pub struct MemoryRelay {
    state: Arc<RwLock<RelayState>>,
    capacity: usize,
}

impl MemoryRelay {
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a relay whose per-connection channels hold `capacity` messages.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(RelayState {
                rooms: HashMap::new(),
                offline: HashSet::new(),
                online: true,
                next_generation: 0,
            })),
            capacity,
        }
    }

    /// Make the relay reachable or not. Going offline drops every connection.
    pub fn set_online(&self, online: bool) {
        let mut state = self.state.write();
        state.online = online;
        if !online {
            state.rooms.clear();
        }
    }

    /// Make one peer reachable or not. Going offline drops its connections.
    pub fn set_peer_online(&self, peer: &PeerId, online: bool) {
        let mut state = self.state.write();
        if online {
            state.offline.remove(peer);
        } else {
            state.offline.insert(peer.clone());
            for peers in state.rooms.values_mut() {
                peers.remove(peer);
            }
        }
    }

    /// Drop a peer's connections. The peer may reconnect right away.
    pub fn kick(&self, peer: &PeerId) {
        let mut state = self.state.write();
        for peers in state.rooms.values_mut() {
            peers.remove(peer);
        }
    }

    /// Peers currently connected to `room_id`.
    pub fn peers_in(&self, room_id: &str) -> Vec<PeerId> {
        self.state
            .read()
            .rooms
            .get(room_id)
            .map(|peers| peers.keys().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryRelay {
    async fn open(&self, room_id: &str, peer: &PeerId) -> Result<Connection, NetworkError> {
        let (out_tx, out_rx) = mpsc::channel(self.capacity);
        let (in_tx, in_rx) = mpsc::channel(self.capacity);

        let generation = {
            let mut state = self.state.write();
            if !state.online || state.offline.contains(peer) {
                return Err(NetworkError::Unreachable(peer.clone()));
            }
            state.next_generation += 1;
            let generation = state.next_generation;
            state.rooms.entry(room_id.to_string()).or_default().insert(
                peer.clone(),
                RelayPeer {
                    inbox: in_tx,
                    generation,
                },
            );
            generation
        };

        tokio::spawn(route(
            self.state.clone(),
            room_id.to_string(),
            peer.clone(),
            generation,
            out_rx,
        ));

        Ok(Connection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

/// Forward one connection's outgoing messages until it closes or is dropped
/// by the relay.
async fn route(
    state: Arc<RwLock<RelayState>>,
    room_id: String,
    from: PeerId,
    generation: u64,
    mut outgoing: mpsc::Receiver<Message>,
) {
    while let Some(message) = outgoing.recv().await {
        let routed = {
            let state = state.read();
            if !state.is_current(&room_id, &from, generation) {
                None
            } else {
                let own = state
                    .rooms
                    .get(&room_id)
                    .and_then(|peers| peers.get(&from))
                    .map(|p| p.inbox.clone());
                Some((state.targets(&room_id, &from, &message), own))
            }
        };
        let Some((targets, own)) = routed else {
            break;
        };

        for inbox in targets {
            let _ = inbox
                .send(Envelope {
                    from: from.clone(),
                    message: message.clone(),
                })
                .await;
        }

        if let (Message::Operations { last_seq, .. }, Some(own)) = (&message, own) {
            let _ = own
                .send(Envelope {
                    from: PeerId::new(RELAY_ID),
                    message: Message::Ack { upto: *last_seq },
                })
                .await;
        }
    }

    let mut state = state.write();
    if state.is_current(&room_id, &from, generation) {
        if let Some(peers) = state.rooms.get_mut(&room_id) {
            peers.remove(&from);
        }
    }
    tracing::trace!(peer = %from, room = %room_id, "relay connection closed");
}
