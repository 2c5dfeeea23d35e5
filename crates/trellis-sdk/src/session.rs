//! Room sessions.
//!
//! Joining a room is checked by a [`RoomAuthority`], the stand-in for a
//! hosted room service. A successful join yields a [`Session`]: a fresh
//! client identity, the room's collaborative graph and the sync adapter that
//! keeps it in step with the other members.

use crate::client::ClientConfig;
use crate::document::CollaborativeGraph;
use crate::error::SdkError;
use crate::network::{PeerId, Transport};
use crate::sync::{OperationSink, SyncAdapter, SyncStatus};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use ulid::Ulid;

/// Credentials presented when joining a room.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
}

impl Credentials {
    pub fn token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

/// Decides who may join which room.
#[async_trait]
pub trait RoomAuthority: Send + Sync + 'static {
    /// Succeeds when `credentials` grant access to `room_id`.
    ///
    /// Fails with [`SdkError::RoomNotFound`] or [`SdkError::Authentication`].
    async fn authorize(&self, room_id: &str, credentials: &Credentials) -> Result<(), SdkError>;
}

/// In-memory room registry with one access token per room.
#[derive(Default)]
pub struct MemoryRoomAuthority {
    rooms: RwLock<HashMap<String, String>>,
}

impl MemoryRoomAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a room, builder style.
    pub fn with_room(self, room_id: impl Into<String>, token: impl Into<String>) -> Self {
        self.add_room(room_id, token);
        self
    }

    pub fn add_room(&self, room_id: impl Into<String>, token: impl Into<String>) {
        self.rooms.write().insert(room_id.into(), token.into());
    }

    pub fn remove_room(&self, room_id: &str) {
        self.rooms.write().remove(room_id);
    }
}

#[async_trait]
impl RoomAuthority for MemoryRoomAuthority {
    async fn authorize(&self, room_id: &str, credentials: &Credentials) -> Result<(), SdkError> {
        match self.rooms.read().get(room_id) {
            None => Err(SdkError::RoomNotFound(room_id.to_string())),
            Some(token) if *token == credentials.token => Ok(()),
            Some(_) => Err(SdkError::Authentication(room_id.to_string())),
        }
    }
}

/// A joined room.
pub struct Session {
    session_id: String,
    room_id: String,
    client_id: PeerId,
    user_name: String,
    graph: Arc<CollaborativeGraph>,
    adapter: Arc<SyncAdapter>,
}

impl Session {
    /// Bind a fresh client identity to `room_id` and start syncing.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn open(room_id: &str, config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let client_id = PeerId::new(Ulid::new().to_string());
        let graph = Arc::new(CollaborativeGraph::new(client_id.as_str()));
        let adapter = Arc::new(SyncAdapter::new(
            client_id.clone(),
            config.user_name.clone(),
            room_id,
            transport,
            config.sync.clone(),
        ));

        let sink: Arc<dyn OperationSink> = graph.clone();
        adapter.on_receive(sink);
        graph.attach(adapter.clone());
        adapter.connect();

        tracing::debug!(room = %room_id, client = %client_id, "session opened");

        Self {
            session_id: Ulid::new().to_string(),
            room_id: room_id.to_string(),
            client_id,
            user_name: config.user_name.clone(),
            graph,
            adapter,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// The identity stamped on every operation of this session.
    pub fn client_id(&self) -> &PeerId {
        &self.client_id
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    /// The room's shared graph.
    pub fn graph(&self) -> &Arc<CollaborativeGraph> {
        &self.graph
    }

    pub fn status(&self) -> SyncStatus {
        self.adapter.status()
    }

    /// Subscribe to sync status changes.
    pub fn subscribe_status(&self) -> broadcast::Receiver<SyncStatus> {
        self.adapter.subscribe()
    }

    /// Local operations not yet acknowledged by the relay.
    pub fn pending(&self) -> usize {
        self.adapter.pending()
    }

    /// Restart syncing after the adapter gave up or after
    /// [`disconnect`](Self::disconnect). Queued edits are replayed.
    pub fn reconnect(&self) {
        self.adapter.connect();
    }

    /// Stop syncing. The graph stays readable and editable; unacknowledged
    /// edits stay queued.
    pub async fn disconnect(&self) {
        self.adapter.disconnect().await;
        tracing::debug!(room = %self.room_id, client = %self.client_id, "session closed");
    }
}
