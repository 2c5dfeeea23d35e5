//! Document layer for Trellis: the replicated graph store and local undo.
//!
//! - [`store`] - merge of operations into a materialized graph
//! - [`record`] - per-entity LWW registers and tombstones
//! - [`snapshot`] - read view and change diffs
//! - [`undo`] - batch-based undo/redo
//! - [`error`] - error types

pub mod error;
pub mod record;
pub mod snapshot;
pub mod store;
pub mod undo;

pub use error::{DbError, Result};
pub use snapshot::{EntityChange, Snapshot, StateDiff};
pub use store::{ApplyOutcome, DocumentStore};
pub use undo::{BatchId, UndoBatch, UndoManager, UndoStep};
