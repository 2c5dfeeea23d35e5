//! Materialized view and change diffs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use trellis_oplog::{Edge, Node};

/// The visible graph: every created, non-tombstoned node and edge.
///
/// Maps are ordered by id so that two replicas holding the same graph
/// compare equal.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub nodes: BTreeMap<String, Node>,
    pub edges: BTreeMap<String, Edge>,
}

impl Snapshot {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    /// Visible edges with `node_id` as source or target.
    pub fn edges_touching<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |e| e.touches(node_id))
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

/// How one entity changed in the view.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum EntityChange<T> {
    Added(T),
    Updated(T),
    Removed(String),
}

impl<T> EntityChange<T> {
    /// Compare an entity's view before and after a merge.
    pub fn between(id: &str, before: Option<&T>, after: Option<&T>) -> Option<Self>
    where
        T: Clone + PartialEq,
    {
        match (before, after) {
            (None, Some(a)) => Some(EntityChange::Added(a.clone())),
            (Some(b), Some(a)) if b != a => Some(EntityChange::Updated(a.clone())),
            (Some(_), None) => Some(EntityChange::Removed(id.to_string())),
            _ => None,
        }
    }
}

/// Changes to the view caused by one or more merged operations.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateDiff {
    pub nodes: Vec<EntityChange<Node>>,
    pub edges: Vec<EntityChange<Edge>>,
}

impl StateDiff {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    pub fn extend(&mut self, other: StateDiff) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
    }
}
