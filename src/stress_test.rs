use async_stream::stream;
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use trellis_db::DocumentStore;
use trellis_oplog::{Collection, EdgePatch, Mutation, NodePatch, OperationEncoder, Position, Size};

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_replicas: usize,
    pub operations_per_replica: usize,
    pub total_syncs: usize,
    pub operations_shipped: usize,
    pub total_time: Duration,
    pub avg_sync_time: Duration,
    pub ops_per_second: f64,
    pub converged: bool,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Stress Test Statistics                        ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Replicas:        {:>30} ║", self.num_replicas);
        println!("║  Operations per Replica:    {:>30} ║", self.operations_per_replica);
        println!("║  Total Sync Rounds:         {:>30} ║", self.total_syncs);
        println!("║  Operations Shipped:        {:>30} ║", self.operations_shipped);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Sync Time:         {:>28}µs ║", self.avg_sync_time.as_micros());
        println!("║  Operations/Second:         {:>30.0} ║", self.ops_per_second);
        println!("║  Converged:                 {:>30} ║", if self.converged { "yes" } else { "NO" });
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

/// One editor: its own encoder over its own copy of the document.
struct Replica {
    encoder: OperationEncoder,
    store: DocumentStore,
}

impl Replica {
    fn new(idx: usize) -> Self {
        Self {
            encoder: OperationEncoder::new(format!("replica_{}", idx)),
            store: DocumentStore::new(),
        }
    }

    fn edit(&mut self, mutation: Mutation) {
        self.encoder.observe(self.store.max_clock());
        let op = self.encoder.encode(mutation);
        if let Err(e) = self.store.apply(op) {
            tracing::warn!(error = %e, "local edit rejected");
        }
    }
}

/// A random edit over a small shared id space so replicas contend.
fn random_mutation(rng: &mut StdRng, shared_nodes: usize) -> Mutation {
    let node = format!("n{}", rng.gen_range(0..shared_nodes));
    match rng.gen_range(0..11) {
        0..=1 => Mutation::insert_node(
            node,
            NodePatch {
                position: Some(Position::new(rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0))),
                label: Some(format!("node {}", rng.gen_range(0..1000))),
                ..Default::default()
            },
        ),
        2..=4 => Mutation::update_node(
            node,
            NodePatch::position(Position::new(rng.gen_range(-500.0..500.0), rng.gen_range(-500.0..500.0))),
        ),
        5 => Mutation::update_node(node, NodePatch::label(format!("label {}", rng.gen_range(0..1000)))),
        6 => Mutation::update_node(node, NodePatch::size(Size::new(rng.gen_range(20.0..200.0), 50.0))),
        7 => Mutation::delete(Collection::Nodes, node),
        8 => Mutation::restore(Collection::Nodes, node),
        9 => {
            // Re-point an edge that may or may not exist yet
            let target = format!("n{}", rng.gen_range(0..shared_nodes));
            let retarget = format!("n{}", rng.gen_range(0..shared_nodes));
            Mutation::update_edge(
                format!("{}-{}", node, target),
                EdgePatch {
                    source: None,
                    target: Some(retarget),
                },
            )
        }
        _ => {
            let target = format!("n{}", rng.gen_range(0..shared_nodes));
            Mutation::insert_edge(
                format!("{}-{}", node, target),
                EdgePatch {
                    source: Some(node),
                    target: Some(target),
                },
            )
        }
    }
}

/// Generator that yields replica indices for synchronization patterns
fn replica_sync_generator(num_replicas: usize, num_syncs: usize) -> impl Stream<Item = (usize, usize)> {
    stream! {
        let mut rng = StdRng::from_entropy();
        for _ in 0..num_syncs {
            let replica_a = rng.gen_range(0..num_replicas);
            let replica_b = rng.gen_range(0..num_replicas);
            yield (replica_a, replica_b);
        }
    }
}

/// Exchange missing operations in both directions, returning how many moved.
async fn perform_sync(replicas: &[Arc<Mutex<Replica>>], a_idx: usize, b_idx: usize) -> usize {
    let replica_a = Arc::clone(&replicas[a_idx]);
    let replica_b = Arc::clone(&replicas[b_idx]);
    let (mut a, mut b) = tokio::join!(replica_a.lock(), replica_b.lock());

    let to_b = a.store.operations_since(&b.store.cursor());
    let to_a = b.store.operations_since(&a.store.cursor());
    let shipped = to_a.len() + to_b.len();

    if let Err(e) = b.store.apply_all(to_b) {
        tracing::warn!(error = %e, "sync rejected an operation");
    }
    if let Err(e) = a.store.apply_all(to_a) {
        tracing::warn!(error = %e, "sync rejected an operation");
    }
    shipped
}

async fn all_converged(replicas: &[Arc<Mutex<Replica>>]) -> bool {
    let first = replicas[0].lock().await.store.current_state().clone();
    for replica in &replicas[1..] {
        if *replica.lock().await.store.current_state() != first {
            return false;
        }
    }
    true
}

/// Concurrent graph editing followed by random pairwise anti-entropy.
pub async fn stress_test_graph(
    num_replicas: usize,
    ops_per_replica: usize,
    num_syncs: usize,
) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Graph Document Stress Test (Async)                  ║");
    println!("║  Replicas: {} | Ops/Replica: {} | Syncs: {} ║",
             num_replicas, ops_per_replica, num_syncs);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let shared_nodes = (num_replicas * 4).max(8);

    let replicas: Vec<Arc<Mutex<Replica>>> = (0..num_replicas)
        .map(|idx| Arc::new(Mutex::new(Replica::new(idx))))
        .collect();

    println!("\n[Phase 1/3] Editing on every replica...");

    let mut handles = vec![];
    for replica in replicas.iter() {
        let replica = Arc::clone(replica);
        let handle = tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            for i in 0..ops_per_replica {
                let mutation = random_mutation(&mut rng, shared_nodes);
                replica.lock().await.edit(mutation);

                if i % 100 == 0 {
                    tokio::task::yield_now().await;
                }
            }
        });
        handles.push(handle);
    }
    for handle in handles {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "editing task failed");
        }
    }

    println!("[Phase 1/3] ✓ Completed");
    println!("[Phase 2/3] Random pairwise sync...");

    let mut sync_times = vec![];
    let mut total_syncs = 0;
    let mut operations_shipped = 0;
    let mut sync_gen = Box::pin(replica_sync_generator(num_replicas, num_syncs));

    while let Some((a_idx, b_idx)) = sync_gen.next().await {
        if a_idx == b_idx {
            continue;
        }
        let sync_start = Instant::now();
        operations_shipped += perform_sync(&replicas, a_idx, b_idx).await;
        sync_times.push(sync_start.elapsed());
        total_syncs += 1;

        if total_syncs % 100 == 0 {
            println!("  Syncs completed: {}/{}", total_syncs, num_syncs);
        }
    }

    println!("[Phase 2/3] ✓ Completed");
    println!("[Phase 3/3] Closing round through replica 0...");

    // Two passes through a hub reach every replica
    for _ in 0..2 {
        for idx in 1..num_replicas {
            operations_shipped += perform_sync(&replicas, 0, idx).await;
        }
    }
    let converged = all_converged(&replicas).await;

    println!("[Phase 3/3] ✓ Completed");

    let total_time = start.elapsed();
    let avg_sync_time = if !sync_times.is_empty() {
        sync_times.iter().sum::<Duration>() / sync_times.len() as u32
    } else {
        Duration::ZERO
    };
    let total_operations = num_replicas * ops_per_replica + operations_shipped;
    let ops_per_second = total_operations as f64 / total_time.as_secs_f64();

    StressTestStats {
        num_replicas,
        operations_per_replica: ops_per_replica,
        total_syncs,
        operations_shipped,
        total_time,
        avg_sync_time,
        ops_per_second,
        converged,
    }
}

/// Run the graph stress test at growing replica counts
pub async fn stress_test_scaling(max_replicas: usize, step_size: usize) -> bool {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Sync Cost vs Replicas              ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut all_converged = true;
    let mut current_replicas = step_size;
    while current_replicas <= max_replicas {
        let stats = stress_test_graph(current_replicas, 50, current_replicas * 20).await;
        stats.print();
        all_converged &= stats.converged;
        current_replicas += step_size;
    }
    all_converged
}
