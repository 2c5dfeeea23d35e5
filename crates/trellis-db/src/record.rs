//! Per-entity merge state.
//!
//! Every field of a node or edge is its own last-writer-wins register, and
//! so is the tombstone. Whether an insert has been seen is a grow-only flag.
//! Each of these merges commutatively, so an entity's state depends only on
//! the set of operations applied to it and not on their order.

use trellis_core::{LWWRegister, Stamp};
use trellis_oplog::{Edge, EdgePatch, Node, NodePatch, Position, Size};

/// Existence of an entity: created by any insert, hidden by the tombstone.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Lifecycle {
    created: bool,
    removed: LWWRegister<bool>,
}

impl Lifecycle {
    pub fn mark_created(&mut self) -> bool {
        let changed = !self.created;
        self.created = true;
        changed
    }

    /// Write the tombstone. `true` deletes, `false` restores.
    pub fn set_removed(&mut self, removed: bool, stamp: &Stamp) -> bool {
        self.removed.set(removed, stamp)
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_tombstoned(&self) -> bool {
        self.removed.get().copied().unwrap_or(false)
    }

    pub fn is_visible(&self) -> bool {
        self.created && !self.is_tombstoned()
    }
}

/// Merge state shared by node and edge records.
pub trait Record: Default + Clone {
    type Entity: Clone + PartialEq;
    type Patch: Clone;

    fn lifecycle(&self) -> &Lifecycle;

    fn lifecycle_mut(&mut self) -> &mut Lifecycle;

    /// LWW-write every field present in `patch`.
    fn write(&mut self, patch: &Self::Patch, stamp: &Stamp);

    /// Current values of the fields present in `patch`, for building an
    /// inverse. Fields that were never written are left out.
    fn prior(&self, patch: &Self::Patch) -> Self::Patch;

    fn is_empty_patch(patch: &Self::Patch) -> bool;

    /// The entity as the view shows it, or `None` while hidden.
    fn materialize(&self, id: &str) -> Option<Self::Entity>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodeRecord {
    lifecycle: Lifecycle,
    position: LWWRegister<Position>,
    size: LWWRegister<Size>,
    label: LWWRegister<String>,
}

impl Record for NodeRecord {
    type Entity = Node;
    type Patch = NodePatch;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn write(&mut self, patch: &NodePatch, stamp: &Stamp) {
        if let Some(position) = patch.position {
            self.position.set(position, stamp);
        }
        if let Some(size) = patch.size {
            self.size.set(size, stamp);
        }
        if let Some(label) = &patch.label {
            self.label.set(label.clone(), stamp);
        }
    }

    fn prior(&self, patch: &NodePatch) -> NodePatch {
        NodePatch {
            position: patch.position.and(self.position.get().copied()),
            size: patch.size.and(self.size.get().copied()),
            label: patch.label.as_ref().and(self.label.get().cloned()),
        }
    }

    fn is_empty_patch(patch: &NodePatch) -> bool {
        patch.is_empty()
    }

    fn materialize(&self, id: &str) -> Option<Node> {
        if !self.lifecycle.is_visible() {
            return None;
        }
        Some(Node {
            id: id.to_string(),
            position: self.position.get().copied().unwrap_or_default(),
            size: self.size.get().copied().unwrap_or_default(),
            label: self.label.get().cloned().unwrap_or_default(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct EdgeRecord {
    lifecycle: Lifecycle,
    source: LWWRegister<String>,
    target: LWWRegister<String>,
}

impl Record for EdgeRecord {
    type Entity = Edge;
    type Patch = EdgePatch;

    fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    fn lifecycle_mut(&mut self) -> &mut Lifecycle {
        &mut self.lifecycle
    }

    fn write(&mut self, patch: &EdgePatch, stamp: &Stamp) {
        if let Some(source) = &patch.source {
            self.source.set(source.clone(), stamp);
        }
        if let Some(target) = &patch.target {
            self.target.set(target.clone(), stamp);
        }
    }

    fn prior(&self, patch: &EdgePatch) -> EdgePatch {
        EdgePatch {
            source: patch.source.as_ref().and(self.source.get().cloned()),
            target: patch.target.as_ref().and(self.target.get().cloned()),
        }
    }

    fn is_empty_patch(patch: &EdgePatch) -> bool {
        patch.is_empty()
    }

    fn materialize(&self, id: &str) -> Option<Edge> {
        if !self.lifecycle.is_visible() {
            return None;
        }
        Some(Edge {
            id: id.to_string(),
            source: self.source.get().cloned().unwrap_or_default(),
            target: self.target.get().cloned().unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uncreated_record_is_hidden() {
        let mut record = NodeRecord::default();
        record.write(&NodePatch::label("E"), &Stamp::new(2, "b"));
        assert!(record.materialize("5").is_none());

        record.lifecycle_mut().mark_created();
        assert_eq!(record.materialize("5").unwrap().label, "E");
    }

    #[test]
    fn test_tombstone_lww() {
        let mut lifecycle = Lifecycle::default();
        lifecycle.mark_created();
        lifecycle.set_removed(true, &Stamp::new(5, "a"));
        // Older restore loses
        lifecycle.set_removed(false, &Stamp::new(4, "b"));
        assert!(lifecycle.is_tombstoned());

        lifecycle.set_removed(false, &Stamp::new(6, "b"));
        assert!(lifecycle.is_visible());
    }

    #[test]
    fn test_prior_only_reports_written_fields() {
        let mut record = NodeRecord::default();
        record.write(&NodePatch::label("A"), &Stamp::new(1, "a"));

        let asked = NodePatch {
            position: Some(Position::new(1.0, 2.0)),
            label: Some("B".to_string()),
            ..Default::default()
        };
        let prior = record.prior(&asked);
        assert_eq!(prior.label.as_deref(), Some("A"));
        assert!(prior.position.is_none());
        assert!(prior.size.is_none());
    }
}
