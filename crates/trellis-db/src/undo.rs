//! Undo/Redo - batch-based local undo for collaborative graphs.
//!
//! Provides:
//! - Local undo/redo (only the local user's batches are tracked)
//! - Batches spanning both collections, undone atomically
//! - Inverses computed when a batch is recorded, never at undo time
//! - Explicit grouping of several edits into one batch
//!
//! Undo does not roll the document back. The inverses are applied as fresh
//! local operations, so a remote edit made in between is resolved by
//! last-writer-wins like any other concurrent write.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use trellis_oplog::{Mutation, OpId, OpKind, Operation, Payload};
use ulid::Ulid;

/// Unique identifier for an undo batch.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId(String);

impl BatchId {
    pub fn new() -> Self {
        Self(Ulid::new().to_string())
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

/// One recorded operation with what undoes and what redoes it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UndoStep {
    pub applied: OpId,
    pub inverse: Option<Mutation>,
    pub redo: Vec<Mutation>,
}

impl UndoStep {
    /// Build a step for `op` given the inverse computed before it applied.
    ///
    /// An insert that created the entity is undone by a delete; since an
    /// insert never clears a tombstone, its redo is a restore followed by
    /// the original field writes.
    pub fn new(op: &Operation, inverse: Option<Mutation>) -> Self {
        let forward = op.mutation();
        let created = op.kind == OpKind::Insert
            && matches!(&inverse, Some(m) if m.kind == OpKind::Delete);

        let redo = if created {
            let mut redo = vec![Mutation::restore(forward.collection, forward.target.clone())];
            let has_fields = match &forward.payload {
                Payload::Node(p) => !p.is_empty(),
                Payload::Edge(p) => !p.is_empty(),
                Payload::None => false,
            };
            if has_fields {
                redo.push(Mutation {
                    kind: OpKind::Update,
                    ..forward
                });
            }
            redo
        } else {
            vec![forward]
        };

        Self {
            applied: op.id(),
            inverse,
            redo,
        }
    }
}

/// Local operations produced by one user-visible action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UndoBatch {
    pub id: BatchId,
    steps: Vec<UndoStep>,
}

impl UndoBatch {
    pub fn new() -> Self {
        Self {
            id: BatchId::new(),
            steps: Vec::new(),
        }
    }

    /// Record an applied operation with its precomputed inverse.
    pub fn push(&mut self, op: &Operation, inverse: Option<Mutation>) {
        self.steps.push(UndoStep::new(op, inverse));
    }

    pub fn steps(&self) -> &[UndoStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Inverses, newest first.
    pub fn undo_mutations(&self) -> Vec<Mutation> {
        self.steps
            .iter()
            .rev()
            .filter_map(|step| step.inverse.clone())
            .collect()
    }

    /// Forward mutations in original order.
    pub fn redo_mutations(&self) -> Vec<Mutation> {
        self.steps
            .iter()
            .filter(|step| step.inverse.is_some())
            .flat_map(|step| step.redo.iter().cloned())
            .collect()
    }
}

impl Default for UndoBatch {
    fn default() -> Self {
        Self::new()
    }
}

/// Undo manager for one replica's local edits.
#[derive(Clone, Debug)]
pub struct UndoManager {
    undo_stack: VecDeque<UndoBatch>,
    redo_stack: VecDeque<UndoBatch>,
    /// Batch being built between `begin_group` and `end_group`.
    open_group: Option<UndoBatch>,
    max_batches: usize,
}

impl UndoManager {
    pub fn new() -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            open_group: None,
            max_batches: 100,
        }
    }

    /// Set the maximum number of batches kept on the undo stack.
    pub fn set_max_batches(&mut self, max: usize) {
        self.max_batches = max;
        self.trim();
    }

    /// Record a batch of local operations. Clears the redo stack.
    ///
    /// While a group is open the batch joins the group instead.
    pub fn record_batch(&mut self, batch: UndoBatch) {
        if batch.is_empty() {
            return;
        }
        if let Some(group) = self.open_group.as_mut() {
            group.steps.extend(batch.steps);
            return;
        }
        self.undo_stack.push_back(batch);
        self.redo_stack.clear();
        self.trim();
    }

    /// Start collecting batches into one undo step.
    pub fn begin_group(&mut self) -> BatchId {
        let group = self.open_group.get_or_insert_with(UndoBatch::new);
        group.id.clone()
    }

    /// Close the current group and record it.
    pub fn end_group(&mut self) {
        if let Some(group) = self.open_group.take() {
            self.record_batch(group);
        }
    }

    pub fn is_grouping(&self) -> bool {
        self.open_group.is_some()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
            || self.open_group.as_ref().is_some_and(|g| !g.is_empty())
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Undo the newest batch. Returns the inverse mutations to apply as new
    /// local operations, newest first.
    pub fn undo(&mut self) -> Vec<Mutation> {
        self.end_group();
        match self.undo_stack.pop_back() {
            Some(batch) => {
                let inverses = batch.undo_mutations();
                self.redo_stack.push_back(batch);
                inverses
            }
            None => Vec::new(),
        }
    }

    /// Redo the most recently undone batch. Returns the mutations to apply.
    pub fn redo(&mut self) -> Vec<Mutation> {
        match self.redo_stack.pop_back() {
            Some(batch) => {
                let forward = batch.redo_mutations();
                self.undo_stack.push_back(batch);
                forward
            }
            None => Vec::new(),
        }
    }

    pub fn undo_stack_size(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_stack_size(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.open_group = None;
    }

    fn trim(&mut self) {
        while self.undo_stack.len() > self.max_batches {
            self.undo_stack.pop_front();
        }
    }
}

impl Default for UndoManager {
    fn default() -> Self {
        Self::new()
    }
}
