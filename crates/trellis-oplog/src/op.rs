//! Operation records.
//!
//! A [`Mutation`] is an unstamped change described by a caller. The
//! [`OperationEncoder`](crate::encoder::OperationEncoder) turns it into an
//! [`Operation`] by attaching the origin client, its next sequence number and
//! a Lamport clock value. Operations are immutable once created.

use crate::error::CodecError;
use crate::model::{EdgePatch, NodePatch};
use serde::{Deserialize, Serialize};
use std::fmt;
use trellis_core::{ClientId, SeqNo, Stamp};

/// What an operation does to its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
    /// Explicit un-delete of a tombstoned entity.
    Restore,
}

/// Which collection of the document an operation targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Nodes,
    Edges,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Nodes => write!(f, "nodes"),
            Collection::Edges => write!(f, "edges"),
        }
    }
}

/// Field values carried by inserts and updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    #[default]
    None,
    Node(NodePatch),
    Edge(EdgePatch),
}

impl Payload {
    pub fn is_none(&self) -> bool {
        matches!(self, Payload::None)
    }

    fn collection(&self) -> Option<Collection> {
        match self {
            Payload::None => None,
            Payload::Node(_) => Some(Collection::Nodes),
            Payload::Edge(_) => Some(Collection::Edges),
        }
    }
}

/// Unique identity of an operation: `(origin, seq)`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OpId {
    pub origin: ClientId,
    pub seq: SeqNo,
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.origin, self.seq)
    }
}

/// A change before it is stamped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mutation {
    pub kind: OpKind,
    pub collection: Collection,
    pub target: String,
    #[serde(default, skip_serializing_if = "Payload::is_none")]
    pub payload: Payload,
}

impl Mutation {
    pub fn insert_node(id: impl Into<String>, patch: NodePatch) -> Self {
        Self {
            kind: OpKind::Insert,
            collection: Collection::Nodes,
            target: id.into(),
            payload: Payload::Node(patch),
        }
    }

    pub fn update_node(id: impl Into<String>, patch: NodePatch) -> Self {
        Self {
            kind: OpKind::Update,
            collection: Collection::Nodes,
            target: id.into(),
            payload: Payload::Node(patch),
        }
    }

    pub fn insert_edge(id: impl Into<String>, patch: EdgePatch) -> Self {
        Self {
            kind: OpKind::Insert,
            collection: Collection::Edges,
            target: id.into(),
            payload: Payload::Edge(patch),
        }
    }

    pub fn update_edge(id: impl Into<String>, patch: EdgePatch) -> Self {
        Self {
            kind: OpKind::Update,
            collection: Collection::Edges,
            target: id.into(),
            payload: Payload::Edge(patch),
        }
    }

    pub fn delete(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Delete,
            collection,
            target: id.into(),
            payload: Payload::None,
        }
    }

    pub fn restore(collection: Collection, id: impl Into<String>) -> Self {
        Self {
            kind: OpKind::Restore,
            collection,
            target: id.into(),
            payload: Payload::None,
        }
    }

    /// Check that kind, collection and payload fit together.
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.target.is_empty() {
            return Err(CodecError::Malformed("empty target id".to_string()));
        }
        match self.kind {
            OpKind::Insert | OpKind::Update => match self.payload.collection() {
                Some(c) if c == self.collection => Ok(()),
                Some(c) => Err(CodecError::Malformed(format!(
                    "{:?} on {} carries a {} payload",
                    self.kind, self.collection, c
                ))),
                None => Err(CodecError::Malformed(format!(
                    "{:?} on {} without payload",
                    self.kind, self.collection
                ))),
            },
            OpKind::Delete | OpKind::Restore => {
                if self.payload.is_none() {
                    Ok(())
                } else {
                    Err(CodecError::Malformed(format!(
                        "{:?} must not carry a payload",
                        self.kind
                    )))
                }
            }
        }
    }
}

/// A stamped, immutable operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    pub origin: ClientId,
    pub seq: SeqNo,
    pub clock: u64,
    pub kind: OpKind,
    pub collection: Collection,
    pub target: String,
    #[serde(default, skip_serializing_if = "Payload::is_none")]
    pub payload: Payload,
}

impl Operation {
    pub fn new(origin: impl Into<ClientId>, seq: SeqNo, clock: u64, mutation: Mutation) -> Self {
        Self {
            origin: origin.into(),
            seq,
            clock,
            kind: mutation.kind,
            collection: mutation.collection,
            target: mutation.target,
            payload: mutation.payload,
        }
    }

    pub fn id(&self) -> OpId {
        OpId {
            origin: self.origin.clone(),
            seq: self.seq,
        }
    }

    /// The last-writer-wins stamp of every field this operation writes.
    pub fn stamp(&self) -> Stamp {
        Stamp::new(self.clock, self.origin.clone())
    }

    /// The unstamped change this operation carries.
    pub fn mutation(&self) -> Mutation {
        Mutation {
            kind: self.kind,
            collection: self.collection,
            target: self.target.clone(),
            payload: self.payload.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), CodecError> {
        if self.origin.is_empty() {
            return Err(CodecError::Malformed("empty origin".to_string()));
        }
        if self.seq == 0 {
            return Err(CodecError::Malformed("sequence numbers start at 1".to_string()));
        }
        if self.clock == 0 {
            return Err(CodecError::Malformed("clock must be positive".to_string()));
        }
        self.mutation().validate()
    }
}
