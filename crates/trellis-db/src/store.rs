//! Document State Store - the replicated graph.
//!
//! The store folds operations into per-entity records and keeps a
//! materialized [`Snapshot`] in step with them. Merging rules:
//!
//! - **insert** marks the entity created and LWW-writes the patch fields.
//!   Inserting an id that already exists behaves as an update of the
//!   overlapping fields.
//! - **update** LWW-writes the patch fields. Updates that reach an entity
//!   before its insert are kept and show up once the insert lands.
//! - **delete** / **restore** LWW-write the tombstone. A tombstoned entity
//!   keeps accepting field writes but stays out of the view until an
//!   explicit restore wins.
//!
//! All of these commute, so replicas that applied the same set of
//! operations hold equal snapshots whatever the arrival order. Re-applying
//! an operation is detected through the `(origin, seq)` seen-set.

use crate::error::Result;
use crate::record::{EdgeRecord, NodeRecord, Record};
use crate::snapshot::{EntityChange, Snapshot, StateDiff};
use std::collections::BTreeMap;
use trellis_core::{ClientId, SeenSet, SeqNo, VersionVector};
use trellis_oplog::{Collection, Mutation, OpId, OpKind, Operation, Payload};

/// Result of merging one operation.
#[derive(Clone, Debug, PartialEq)]
pub enum ApplyOutcome {
    /// The operation was already applied; nothing changed.
    Duplicate,
    /// The operation is now part of the history. The diff is empty when the
    /// visible graph did not change (e.g. a write that lost LWW).
    Applied(StateDiff),
}

impl ApplyOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Duplicate)
    }

    pub fn diff(&self) -> Option<&StateDiff> {
        match self {
            ApplyOutcome::Applied(diff) => Some(diff),
            ApplyOutcome::Duplicate => None,
        }
    }
}

/// In-memory replica of one collaborative graph.
#[derive(Clone, Debug, Default)]
pub struct DocumentStore {
    nodes: BTreeMap<String, NodeRecord>,
    edges: BTreeMap<String, EdgeRecord>,
    seen: SeenSet,
    log: BTreeMap<ClientId, BTreeMap<SeqNo, Operation>>,
    view: Snapshot,
    max_clock: u64,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one operation into the replica.
    pub fn apply(&mut self, op: Operation) -> Result<ApplyOutcome> {
        op.validate()?;
        if !self.seen.insert(&op.origin, op.seq) {
            tracing::trace!(op = %op.id(), "duplicate operation ignored");
            return Ok(ApplyOutcome::Duplicate);
        }
        self.max_clock = self.max_clock.max(op.clock);

        let mut diff = StateDiff::default();
        match (&op.collection, &op.payload) {
            (Collection::Nodes, payload) => {
                let patch = match payload {
                    Payload::Node(p) => Some(p),
                    _ => None,
                };
                if let Some(change) = merge_into(&mut self.nodes, &mut self.view.nodes, &op, patch) {
                    diff.nodes.push(change);
                }
            }
            (Collection::Edges, payload) => {
                let patch = match payload {
                    Payload::Edge(p) => Some(p),
                    _ => None,
                };
                if let Some(p) = patch.filter(|_| op.kind == OpKind::Insert) {
                    self.warn_dangling(&op.target, p.source.as_deref());
                    self.warn_dangling(&op.target, p.target.as_deref());
                }
                if let Some(change) = merge_into(&mut self.edges, &mut self.view.edges, &op, patch) {
                    diff.edges.push(change);
                }
            }
        }

        self.log
            .entry(op.origin.clone())
            .or_default()
            .insert(op.seq, op);
        Ok(ApplyOutcome::Applied(diff))
    }

    /// Merge several operations, folding their diffs together.
    pub fn apply_all(&mut self, ops: impl IntoIterator<Item = Operation>) -> Result<StateDiff> {
        let mut diff = StateDiff::default();
        for op in ops {
            if let ApplyOutcome::Applied(d) = self.apply(op)? {
                diff.extend(d);
            }
        }
        Ok(diff)
    }

    /// Read view of the visible graph.
    pub fn current_state(&self) -> &Snapshot {
        &self.view
    }

    /// Whether the operation has been applied.
    pub fn contains(&self, id: &OpId) -> bool {
        self.seen.contains(&id.origin, id.seq)
    }

    /// Contiguous per-origin frontier of applied operations.
    pub fn cursor(&self) -> VersionVector {
        self.seen.frontier()
    }

    /// Every retained operation a peer at `cursor` may be missing, ordered by
    /// origin and sequence number.
    pub fn operations_since(&self, cursor: &VersionVector) -> Vec<Operation> {
        self.log
            .iter()
            .flat_map(|(origin, ops)| {
                let from = cursor.get(origin);
                ops.range(from + 1..).map(|(_, op)| op.clone())
            })
            .collect()
    }

    /// Number of distinct operations applied.
    pub fn operation_count(&self) -> usize {
        self.log.values().map(|ops| ops.len()).sum()
    }

    /// Highest Lamport clock among applied operations.
    pub fn max_clock(&self) -> u64 {
        self.max_clock
    }

    /// Whether an entity was ever referenced by an operation, visible or not.
    pub fn knows(&self, collection: Collection, id: &str) -> bool {
        match collection {
            Collection::Nodes => self.nodes.contains_key(id),
            Collection::Edges => self.edges.contains_key(id),
        }
    }

    /// Whether the entity's tombstone is currently set. An insert alone will
    /// not bring it back.
    pub fn is_tombstoned(&self, collection: Collection, id: &str) -> bool {
        match collection {
            Collection::Nodes => self.nodes.get(id).is_some_and(|r| r.lifecycle().is_tombstoned()),
            Collection::Edges => self.edges.get(id).is_some_and(|r| r.lifecycle().is_tombstoned()),
        }
    }

    /// Compute the mutation that undoes `mutation` against the current state.
    ///
    /// Must be called before `mutation` is applied. Returns `None` when the
    /// mutation would not change anything worth undoing.
    pub fn invert(&self, mutation: &Mutation) -> Option<Mutation> {
        match (&mutation.collection, &mutation.payload) {
            (Collection::Nodes, Payload::Node(patch)) => {
                invert_in(self.nodes.get(&mutation.target), mutation, Some(patch))
                    .map(|inv| inv.into_mutation(mutation, Payload::Node))
            }
            (Collection::Edges, Payload::Edge(patch)) => {
                invert_in(self.edges.get(&mutation.target), mutation, Some(patch))
                    .map(|inv| inv.into_mutation(mutation, Payload::Edge))
            }
            (Collection::Nodes, _) => invert_in::<NodeRecord>(
                self.nodes.get(&mutation.target),
                mutation,
                None,
            )
            .map(|inv| inv.into_mutation(mutation, Payload::Node)),
            (Collection::Edges, _) => invert_in::<EdgeRecord>(
                self.edges.get(&mutation.target),
                mutation,
                None,
            )
            .map(|inv| inv.into_mutation(mutation, Payload::Edge)),
        }
    }

    fn warn_dangling(&self, edge_id: &str, node_id: Option<&str>) {
        if let Some(node_id) = node_id {
            if !self.nodes.contains_key(node_id) {
                tracing::warn!(edge = edge_id, node = node_id, "edge references a node never seen");
            }
        }
    }
}

fn merge_into<R: Record>(
    table: &mut BTreeMap<String, R>,
    view: &mut BTreeMap<String, R::Entity>,
    op: &Operation,
    patch: Option<&R::Patch>,
) -> Option<EntityChange<R::Entity>> {
    let stamp = op.stamp();
    let record = table.entry(op.target.clone()).or_default();
    match op.kind {
        OpKind::Insert => {
            record.lifecycle_mut().mark_created();
            if let Some(p) = patch {
                record.write(p, &stamp);
            }
        }
        OpKind::Update => {
            if let Some(p) = patch {
                record.write(p, &stamp);
            }
        }
        OpKind::Delete => {
            record.lifecycle_mut().set_removed(true, &stamp);
        }
        OpKind::Restore => {
            record.lifecycle_mut().set_removed(false, &stamp);
        }
    }

    let after = record.materialize(&op.target);
    let change = EntityChange::between(&op.target, view.get(&op.target), after.as_ref());
    match after {
        Some(entity) => {
            view.insert(op.target.clone(), entity);
        }
        None => {
            view.remove(&op.target);
        }
    }
    change
}

enum Inverse<P> {
    Update(P),
    Delete,
    Restore,
}

impl<P> Inverse<P> {
    fn into_mutation(self, of: &Mutation, wrap: impl FnOnce(P) -> Payload) -> Mutation {
        match self {
            Inverse::Update(patch) => Mutation {
                kind: OpKind::Update,
                collection: of.collection,
                target: of.target.clone(),
                payload: wrap(patch),
            },
            Inverse::Delete => Mutation::delete(of.collection, of.target.clone()),
            Inverse::Restore => Mutation::restore(of.collection, of.target.clone()),
        }
    }
}

fn invert_in<R: Record>(
    record: Option<&R>,
    mutation: &Mutation,
    patch: Option<&R::Patch>,
) -> Option<Inverse<R::Patch>> {
    let restore_fields = |record: &R| {
        let prior = record.prior(patch?);
        (!R::is_empty_patch(&prior)).then_some(Inverse::Update(prior))
    };

    match mutation.kind {
        OpKind::Insert => match record {
            Some(r) if r.lifecycle().is_created() => restore_fields(r),
            _ => Some(Inverse::Delete),
        },
        OpKind::Update => record.and_then(restore_fields),
        OpKind::Delete => record
            .filter(|r| r.lifecycle().is_visible())
            .map(|_| Inverse::Restore),
        OpKind::Restore => record
            .filter(|r| r.lifecycle().is_created() && r.lifecycle().is_tombstoned())
            .map(|_| Inverse::Delete),
    }
}
