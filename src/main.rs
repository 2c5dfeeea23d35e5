use stress_test::{stress_test_graph, stress_test_scaling};
use tracing_subscriber::EnvFilter;
pub mod stress_test;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ASYNC STRESS TESTS                              ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut converged = true;

    // Small scale
    let stats = stress_test_graph(4, 100, 200).await;
    stats.print();
    converged &= stats.converged;

    // Medium scale
    let stats = stress_test_graph(10, 500, 1000).await;
    stats.print();
    converged &= stats.converged;

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          SCALING ANALYSIS                                  ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    converged &= stress_test_scaling(20, 4).await;

    if converged {
        println!("\n✓ All stress tests completed, every replica converged!");
    } else {
        eprintln!("\n✗ Replicas diverged");
        std::process::exit(1);
    }
}
