//! The collaborative graph document, the boundary between a diagram UI and
//! the sync core.
//!
//! UI code expresses edits as [`Intent`]s. Each call to
//! [`CollaborativeGraph::mutate`] or [`CollaborativeGraph::transact`] becomes
//! one undo batch: the intents are turned into mutations, stamped, applied
//! optimistically to the local store and queued on the sync adapter. Changes
//! from any source are published as [`GraphEvent::Changed`] diffs.

use crate::error::Result;
use crate::sync::{OperationSink, SyncAdapter, SyncStatus};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use trellis_core::VersionVector;
use trellis_db::{ApplyOutcome, DbError, DocumentStore, Snapshot, StateDiff, UndoBatch, UndoManager};
use trellis_oplog::{
    sample, Collection, Edge, Mutation, Node, NodePatch, Operation, OperationEncoder, Position, Size,
};

/// A user edit.
#[derive(Clone, Debug, PartialEq)]
pub enum Intent {
    AddNode(Node),
    MoveNode { id: String, position: Position },
    ResizeNode { id: String, size: Size },
    RenameNode { id: String, label: String },
    /// Deletes the node and every edge connected to it.
    DeleteNode { id: String },
    AddEdge(Edge),
    DeleteEdge { id: String },
}

/// Events emitted by a collaborative graph.
#[derive(Clone, Debug, PartialEq)]
pub enum GraphEvent {
    /// The visible graph changed, locally or remotely.
    Changed(StateDiff),
    /// The sync status changed.
    Status(SyncStatus),
}

struct GraphState {
    store: DocumentStore,
    encoder: OperationEncoder,
    undo: UndoManager,
}

impl GraphState {
    /// Expand intents into mutations, checking each target against the
    /// graph as it will look at that point of the batch.
    fn plan(&self, intents: Vec<Intent>) -> Result<Vec<Mutation>> {
        let mut view = self.store.current_state().clone();
        // Ids whose tombstone will be set once the batch so far is applied
        let mut removed: BTreeSet<(Collection, String)> = BTreeSet::new();
        let mut mutations = Vec::new();

        for intent in intents {
            match intent {
                Intent::AddNode(node) => {
                    if self.needs_restore(&removed, &view, Collection::Nodes, &node.id) {
                        mutations.push(Mutation::restore(Collection::Nodes, node.id.clone()));
                    }
                    removed.remove(&(Collection::Nodes, node.id.clone()));
                    mutations.push(Mutation::insert_node(node.id.clone(), node.to_patch()));
                    view.nodes.insert(node.id.clone(), node);
                }
                Intent::MoveNode { id, position } => {
                    require(view.node(&id).is_some(), Collection::Nodes, &id)?;
                    mutations.push(Mutation::update_node(id, NodePatch::position(position)));
                }
                Intent::ResizeNode { id, size } => {
                    require(view.node(&id).is_some(), Collection::Nodes, &id)?;
                    mutations.push(Mutation::update_node(id, NodePatch::size(size)));
                }
                Intent::RenameNode { id, label } => {
                    require(view.node(&id).is_some(), Collection::Nodes, &id)?;
                    mutations.push(Mutation::update_node(id, NodePatch::label(label)));
                }
                Intent::DeleteNode { id } => {
                    require(view.nodes.remove(&id).is_some(), Collection::Nodes, &id)?;
                    let connected: Vec<String> =
                        view.edges_touching(&id).map(|e| e.id.clone()).collect();
                    for edge_id in connected {
                        view.edges.remove(&edge_id);
                        removed.insert((Collection::Edges, edge_id.clone()));
                        mutations.push(Mutation::delete(Collection::Edges, edge_id));
                    }
                    removed.insert((Collection::Nodes, id.clone()));
                    mutations.push(Mutation::delete(Collection::Nodes, id));
                }
                Intent::AddEdge(edge) => {
                    if self.needs_restore(&removed, &view, Collection::Edges, &edge.id) {
                        mutations.push(Mutation::restore(Collection::Edges, edge.id.clone()));
                    }
                    removed.remove(&(Collection::Edges, edge.id.clone()));
                    mutations.push(Mutation::insert_edge(edge.id.clone(), edge.to_patch()));
                    view.edges.insert(edge.id.clone(), edge);
                }
                Intent::DeleteEdge { id } => {
                    require(view.edges.remove(&id).is_some(), Collection::Edges, &id)?;
                    removed.insert((Collection::Edges, id.clone()));
                    mutations.push(Mutation::delete(Collection::Edges, id));
                }
            }
        }

        for m in &mutations {
            m.validate()?;
        }
        Ok(mutations)
    }

    /// A re-added id needs an explicit restore when its tombstone is, or will
    /// be, set.
    fn needs_restore(
        &self,
        removed: &BTreeSet<(Collection, String)>,
        view: &Snapshot,
        collection: Collection,
        id: &str,
    ) -> bool {
        let visible = match collection {
            Collection::Nodes => view.node(id).is_some(),
            Collection::Edges => view.edge(id).is_some(),
        };
        !visible
            && (removed.contains(&(collection, id.to_string()))
                || self.store.is_tombstoned(collection, id))
    }

    /// Stamp and apply local mutations, recording inverses into `batch`.
    fn commit(
        &mut self,
        mutations: Vec<Mutation>,
        mut batch: Option<&mut UndoBatch>,
    ) -> Result<(StateDiff, Vec<Operation>)> {
        let mut diff = StateDiff::default();
        let mut ops = Vec::with_capacity(mutations.len());
        for m in mutations {
            let inverse = match batch {
                Some(_) => self.store.invert(&m),
                None => None,
            };
            let op = self.encoder.encode(m);
            if let ApplyOutcome::Applied(d) = self.store.apply(op.clone())? {
                diff.extend(d);
            }
            if let Some(batch) = batch.as_deref_mut() {
                batch.push(&op, inverse);
            }
            ops.push(op);
        }
        Ok((diff, ops))
    }
}

fn require(present: bool, collection: Collection, id: &str) -> std::result::Result<(), DbError> {
    if present {
        Ok(())
    } else {
        Err(DbError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        })
    }
}

/// A replicated graph of nodes and edges.
///
/// Store, encoder and undo history sit behind one lock that is never held
/// across an await.
pub struct CollaborativeGraph {
    client_id: String,
    state: Mutex<GraphState>,
    event_tx: broadcast::Sender<GraphEvent>,
    outbound: RwLock<Option<Arc<SyncAdapter>>>,
}

impl CollaborativeGraph {
    /// Create an empty graph whose operations carry `client_id` as origin.
    pub fn new(client_id: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let (event_tx, _) = broadcast::channel(100);
        Self {
            state: Mutex::new(GraphState {
                store: DocumentStore::new(),
                encoder: OperationEncoder::new(client_id.clone()),
                undo: UndoManager::new(),
            }),
            client_id,
            event_tx,
            outbound: RwLock::new(None),
        }
    }

    /// Route local operations through `adapter`.
    pub fn attach(&self, adapter: Arc<SyncAdapter>) {
        *self.outbound.write() = Some(adapter);
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Subscribe to graph events.
    pub fn subscribe(&self) -> broadcast::Receiver<GraphEvent> {
        self.event_tx.subscribe()
    }

    /// Copy of the visible graph.
    pub fn snapshot(&self) -> Snapshot {
        self.state.lock().store.current_state().clone()
    }

    /// Apply one edit as its own undo batch.
    pub fn mutate(&self, intent: Intent) -> Result<StateDiff> {
        self.transact(vec![intent])
    }

    /// Apply several edits as one undo batch.
    ///
    /// Fails without changing anything if an edit targets an entity that is
    /// not visible at that point of the batch.
    pub fn transact(&self, intents: Vec<Intent>) -> Result<StateDiff> {
        let mut state = self.state.lock();
        let mutations = state.plan(intents)?;
        let mut batch = UndoBatch::new();
        let (diff, ops) = state.commit(mutations, Some(&mut batch))?;
        state.undo.record_batch(batch);
        self.send(&ops)?;
        drop(state);

        self.emit(diff.clone());
        Ok(diff)
    }

    /// Load the starter diagram as one batch.
    pub fn seed(&self) -> Result<StateDiff> {
        let intents = sample::nodes()
            .into_iter()
            .map(Intent::AddNode)
            .chain(sample::edges().into_iter().map(Intent::AddEdge))
            .collect();
        self.transact(intents)
    }

    /// Undo the newest local batch. Remote edits are never undone.
    pub fn undo(&self) -> Result<StateDiff> {
        let mut state = self.state.lock();
        let mutations = state.undo.undo();
        self.replay(state, mutations)
    }

    /// Redo the most recently undone batch.
    pub fn redo(&self) -> Result<StateDiff> {
        let mut state = self.state.lock();
        let mutations = state.undo.redo();
        self.replay(state, mutations)
    }

    pub fn can_undo(&self) -> bool {
        self.state.lock().undo.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.state.lock().undo.can_redo()
    }

    /// Collect the following edits into one undo batch until `end_group`.
    pub fn begin_group(&self) {
        self.state.lock().undo.begin_group();
    }

    pub fn end_group(&self) {
        self.state.lock().undo.end_group();
    }

    /// Number of distinct operations applied, local and remote.
    pub fn operation_count(&self) -> usize {
        self.state.lock().store.operation_count()
    }

    fn replay(
        &self,
        mut state: parking_lot::MutexGuard<'_, GraphState>,
        mutations: Vec<Mutation>,
    ) -> Result<StateDiff> {
        let (diff, ops) = state.commit(mutations, None)?;
        self.send(&ops)?;
        drop(state);

        self.emit(diff.clone());
        Ok(diff)
    }

    /// Queue operations in stamp order; callers hold the state lock.
    fn send(&self, ops: &[Operation]) -> Result<()> {
        if let Some(adapter) = self.outbound.read().as_ref() {
            for op in ops {
                adapter.send(op)?;
            }
        }
        Ok(())
    }

    fn emit(&self, diff: StateDiff) {
        if !diff.is_empty() {
            let _ = self.event_tx.send(GraphEvent::Changed(diff));
        }
    }
}

impl OperationSink for CollaborativeGraph {
    fn receive(&self, op: Operation) {
        let outcome = {
            let mut state = self.state.lock();
            state.encoder.observe(op.clock);
            state.store.apply(op)
        };
        match outcome {
            Ok(ApplyOutcome::Applied(diff)) => self.emit(diff),
            Ok(ApplyOutcome::Duplicate) => {}
            Err(e) => tracing::warn!(client = %self.client_id, error = %e, "rejected remote operation"),
        }
    }

    fn cursor(&self) -> VersionVector {
        self.state.lock().store.cursor()
    }

    fn operations_since(&self, cursor: &VersionVector) -> Vec<Operation> {
        self.state.lock().store.operations_since(cursor)
    }

    fn status_changed(&self, status: SyncStatus) {
        let _ = self.event_tx.send(GraphEvent::Status(status));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SdkError;
    use trellis_db::EntityChange;

    fn sync_pair(from: &CollaborativeGraph, to: &CollaborativeGraph) {
        for op in from.operations_since(&to.cursor()) {
            to.receive(op);
        }
    }

    #[test]
    fn test_add_node_emits_change() {
        let graph = CollaborativeGraph::new("alice");
        let mut events = graph.subscribe();

        let node = Node::new("1", Position::new(0.0, 9.0), "A");
        let diff = graph.mutate(Intent::AddNode(node.clone())).unwrap();
        assert_eq!(diff.nodes, vec![EntityChange::Added(node.clone())]);

        match events.try_recv().unwrap() {
            GraphEvent::Changed(d) => assert_eq!(d, diff),
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(graph.snapshot().node("1"), Some(&node));
    }

    #[test]
    fn test_seed_loads_sample_diagram() {
        let graph = CollaborativeGraph::new("alice");
        graph.seed().unwrap();

        let snapshot = graph.snapshot();
        assert_eq!(snapshot.nodes.len(), 4);
        assert_eq!(snapshot.node("1").unwrap().label, "A");
        assert_eq!(snapshot.edge("e1-2").unwrap().target, "2");

        // One batch
        graph.undo().unwrap();
        assert!(graph.snapshot().is_empty());
    }

    #[test]
    fn test_delete_node_cascades_and_undoes_atomically() {
        let graph = CollaborativeGraph::new("alice");
        graph.seed().unwrap();
        let before = graph.snapshot();

        let diff = graph.mutate(Intent::DeleteNode { id: "1".into() }).unwrap();
        assert_eq!(diff.nodes.len(), 1);
        assert_eq!(diff.edges, vec![EntityChange::Removed("e1-2".to_string())]);
        assert!(graph.snapshot().edge("e1-2").is_none());

        graph.undo().unwrap();
        assert_eq!(graph.snapshot(), before);

        graph.redo().unwrap();
        assert!(graph.snapshot().node("1").is_none());
        assert!(graph.snapshot().edge("e1-2").is_none());
    }

    #[test]
    fn test_re_adding_a_deleted_node_brings_it_back() {
        let graph = CollaborativeGraph::new("alice");
        graph.seed().unwrap();
        graph.mutate(Intent::DeleteNode { id: "1".into() }).unwrap();

        let node = Node::new("1", Position::new(40.0, 40.0), "A again");
        let diff = graph.mutate(Intent::AddNode(node.clone())).unwrap();
        assert!(!diff.is_empty());
        assert_eq!(graph.snapshot().node("1"), Some(&node));

        // The cascaded edge can be re-added too
        graph.mutate(Intent::AddEdge(Edge::new("e1-2", "1", "2"))).unwrap();
        assert!(graph.snapshot().edge("e1-2").is_some());

        // Undoing the re-add hides it again; redo shows it
        graph.undo().unwrap();
        graph.undo().unwrap();
        assert!(graph.snapshot().node("1").is_none());
        graph.redo().unwrap();
        assert_eq!(graph.snapshot().node("1").unwrap().label, "A again");
    }

    #[test]
    fn test_delete_and_re_add_in_one_batch() {
        let graph = CollaborativeGraph::new("alice");
        graph.seed().unwrap();

        graph
            .transact(vec![
                Intent::DeleteEdge { id: "e1-2".into() },
                Intent::AddEdge(Edge::new("e1-2", "2", "3")),
            ])
            .unwrap();
        let edge = graph.snapshot().edge("e1-2").cloned().unwrap();
        assert_eq!((edge.source.as_str(), edge.target.as_str()), ("2", "3"));
    }

    #[test]
    fn test_re_added_node_reaches_peers() {
        let alice = CollaborativeGraph::new("alice");
        let bob = CollaborativeGraph::new("bob");
        alice.seed().unwrap();
        alice.mutate(Intent::DeleteNode { id: "4".into() }).unwrap();
        sync_pair(&alice, &bob);
        assert!(bob.snapshot().node("4").is_none());

        alice
            .mutate(Intent::AddNode(Node::new("4", Position::new(0.0, 0.0), "D")))
            .unwrap();
        sync_pair(&alice, &bob);
        assert_eq!(bob.snapshot(), alice.snapshot());
        assert!(bob.snapshot().node("4").is_some());
    }

    #[test]
    fn test_edit_of_missing_node_fails_without_side_effects() {
        let graph = CollaborativeGraph::new("alice");
        graph.seed().unwrap();
        let count = graph.operation_count();

        let result = graph.transact(vec![
            Intent::RenameNode { id: "1".into(), label: "A1".into() },
            Intent::MoveNode { id: "missing".into(), position: Position::new(1.0, 1.0) },
        ]);
        assert!(matches!(result, Err(SdkError::Document(DbError::NotFound { .. }))));
        assert_eq!(graph.operation_count(), count);
        assert_eq!(graph.snapshot().node("1").unwrap().label, "A");
    }

    #[test]
    fn test_node_added_in_same_batch_can_be_edited() {
        let graph = CollaborativeGraph::new("alice");
        graph
            .transact(vec![
                Intent::AddNode(Node::new("5", Position::new(10.0, 10.0), "")),
                Intent::RenameNode { id: "5".into(), label: "E".into() },
            ])
            .unwrap();
        assert_eq!(graph.snapshot().node("5").unwrap().label, "E");
    }

    #[test]
    fn test_remote_edit_wins_with_later_clock() {
        let alice = CollaborativeGraph::new("alice");
        let bob = CollaborativeGraph::new("bob");

        alice
            .mutate(Intent::AddNode(Node::new("5", Position::new(10.0, 10.0), "")))
            .unwrap();
        sync_pair(&alice, &bob);
        bob.mutate(Intent::RenameNode { id: "5".into(), label: "E".into() })
            .unwrap();
        sync_pair(&bob, &alice);

        for graph in [&alice, &bob] {
            let node = graph.snapshot().node("5").cloned().unwrap();
            assert_eq!(node.position, Position::new(10.0, 10.0));
            assert_eq!(node.label, "E");
        }
    }

    #[test]
    fn test_undo_only_touches_local_batches() {
        let alice = CollaborativeGraph::new("alice");
        let bob = CollaborativeGraph::new("bob");
        alice.seed().unwrap();
        sync_pair(&alice, &bob);

        bob.mutate(Intent::MoveNode { id: "2".into(), position: Position::new(0.0, 0.0) })
            .unwrap();
        sync_pair(&bob, &alice);

        // Alice's only batch is the seed; Bob's move is not hers to undo
        alice.undo().unwrap();
        assert!(alice.snapshot().nodes.is_empty());
        assert!(!alice.can_undo());
        assert!(bob.can_undo());
    }

    #[test]
    fn test_grouped_edits_undo_together() {
        let graph = CollaborativeGraph::new("alice");
        graph.seed().unwrap();

        graph.begin_group();
        graph
            .mutate(Intent::MoveNode { id: "1".into(), position: Position::new(5.0, 5.0) })
            .unwrap();
        graph
            .mutate(Intent::RenameNode { id: "1".into(), label: "Start".into() })
            .unwrap();
        graph.end_group();

        graph.undo().unwrap();
        let node = graph.snapshot().node("1").cloned().unwrap();
        assert_eq!(node.position, Position::new(0.0, 9.0));
        assert_eq!(node.label, "A");
    }

    #[test]
    fn test_duplicate_delivery_emits_nothing() {
        let alice = CollaborativeGraph::new("alice");
        let bob = CollaborativeGraph::new("bob");
        alice.seed().unwrap();
        sync_pair(&alice, &bob);

        let mut events = bob.subscribe();
        for op in alice.operations_since(&VersionVector::new()) {
            bob.receive(op);
        }
        assert!(events.try_recv().is_err());
    }
}
