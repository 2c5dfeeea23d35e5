//! High-level client for the Trellis SDK.

use crate::error::SdkError;
use crate::network::{MemoryRelay, Transport};
use crate::session::{Credentials, RoomAuthority, Session};
use crate::sync::SyncConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Configuration for the Trellis client.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// User name announced to peers.
    pub user_name: String,
    /// Sync behavior of every session this client opens.
    pub sync: SyncConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_name: "Anonymous".to_string(),
            sync: SyncConfig::default(),
        }
    }
}

/// Builder for client configuration.
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_name(mut self, name: impl Into<String>) -> Self {
        self.config.user_name = name.into();
        self
    }

    pub fn sync(mut self, sync: SyncConfig) -> Self {
        self.config.sync = sync;
        self
    }

    pub fn max_retries(mut self, retries: Option<u32>) -> Self {
        self.config.sync.max_retries = retries;
        self
    }

    pub fn build(self) -> ClientConfig {
        self.config
    }
}

impl Default for ClientConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The main Trellis client.
///
/// A client joins rooms through a [`RoomAuthority`] and can hold several
/// sessions at once, each with its own identity and connection.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use trellis_sdk::{Client, ClientConfig, Credentials, Intent, MemoryRelay, MemoryRoomAuthority};
/// use trellis_oplog::{Node, Position};
///
/// # async fn run() -> trellis_sdk::Result<()> {
/// let relay = MemoryRelay::new();
/// let authority = Arc::new(MemoryRoomAuthority::new().with_room("design", "secret"));
/// let client = Client::with_memory_relay(ClientConfig::default(), relay, authority);
///
/// let session = client.join_room("design", &Credentials::token("secret")).await?;
/// session
///     .graph()
///     .mutate(Intent::AddNode(Node::new("1", Position::new(0.0, 9.0), "A")))?;
/// # Ok(())
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    authority: Arc<dyn RoomAuthority>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Client {
    /// Create a new client with a custom transport.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        authority: Arc<dyn RoomAuthority>,
    ) -> Self {
        Self {
            config,
            transport,
            authority,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a new client on an in-memory relay (for testing and demos).
    pub fn with_memory_relay(
        config: ClientConfig,
        relay: MemoryRelay,
        authority: Arc<dyn RoomAuthority>,
    ) -> Self {
        Self::new(config, Arc::new(relay), authority)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn user_name(&self) -> &str {
        &self.config.user_name
    }

    /// Join `room_id`, binding a fresh client identity for the session.
    pub async fn join_room(&self, room_id: &str, credentials: &Credentials) -> Result<Arc<Session>, SdkError> {
        self.authority.authorize(room_id, credentials).await?;

        let session = Arc::new(Session::open(room_id, &self.config, self.transport.clone()));
        self.sessions
            .write()
            .insert(session.session_id().to_string(), session.clone());
        tracing::info!(room = %room_id, user = %self.config.user_name, client = %session.client_id(), "joined room");
        Ok(session)
    }

    /// Disconnect and drop one session.
    pub async fn leave_room(&self, session_id: &str) -> Result<(), SdkError> {
        let session = self
            .sessions
            .write()
            .remove(session_id)
            .ok_or_else(|| SdkError::SessionNotFound(session_id.to_string()))?;
        session.disconnect().await;
        Ok(())
    }

    /// Get an existing session.
    pub fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(session_id).cloned()
    }

    /// List all active session IDs.
    pub fn session_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    /// Disconnect every session.
    pub async fn shutdown(&self) {
        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        futures::future::join_all(sessions.iter().map(|s| s.disconnect())).await;
    }
}
