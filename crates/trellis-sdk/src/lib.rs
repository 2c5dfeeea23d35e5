//! Trellis SDK - real-time collaborative diagram editing.
//!
//! This SDK keeps a graph of nodes and edges in sync between the members of
//! a room. Edits apply locally at once, travel as operations through a
//! reconnect-safe adapter and merge on every replica to the same result.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use trellis_sdk::prelude::*;
//!
//! # async fn run() -> trellis_sdk::Result<()> {
//! let relay = MemoryRelay::new();
//! let authority = Arc::new(MemoryRoomAuthority::new().with_room("design", "secret"));
//! let client = Client::with_memory_relay(ClientConfig::default(), relay, authority);
//!
//! let session = client.join_room("design", &Credentials::token("secret")).await?;
//! let graph = session.graph();
//! graph.seed()?;
//! graph.mutate(Intent::RenameNode { id: "1".into(), label: "Start".into() })?;
//! graph.undo()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`client`] - Entry point; joins rooms
//! - [`session`] - Room authority and joined sessions
//! - [`document`] - The collaborative graph and its events
//! - [`sync`] - Sync transport adapter (state machine, outbox, backoff)
//! - [`network`] - Transport abstraction and in-memory relay
//! - [`error`] - Error types

pub mod client;
pub mod document;
pub mod error;
pub mod network;
pub mod session;
pub mod sync;

// Re-exports for convenience
pub use client::{Client, ClientConfig, ClientConfigBuilder};
pub use document::{CollaborativeGraph, GraphEvent, Intent};
pub use error::{Result, SdkError};
pub use network::{Connection, Envelope, MemoryRelay, Message, NetworkError, PeerId, Transport};
pub use session::{Credentials, MemoryRoomAuthority, RoomAuthority, Session};
pub use sync::{
    Backoff, ConnectionEvent, ConnectionState, OperationSink, SyncAdapter, SyncConfig,
    SyncConfigBuilder, SyncStatus,
};

// Re-export commonly used types from the lower layers
pub use trellis_db::{EntityChange, Snapshot, StateDiff};
pub use trellis_oplog::{Edge, Node, Position, Size};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, ClientConfig};
    pub use crate::document::{CollaborativeGraph, GraphEvent, Intent};
    pub use crate::error::SdkError;
    pub use crate::network::{MemoryRelay, Transport};
    pub use crate::session::{Credentials, MemoryRoomAuthority, Session};
    pub use crate::sync::{SyncConfig, SyncStatus};
    pub use trellis_oplog::{Edge, Node, Position, Size};
}
