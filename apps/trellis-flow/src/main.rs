//! # Trellis Flow
//!
//! A CLI walkthrough of collaborative diagram editing on the Trellis SDK.
//! Every scenario runs several clients in one process, connected through an
//! in-memory relay, and shows how their graphs converge.
//!
//! ```text
//! trellis-flow demo       two editors share the starter diagram
//! trellis-flow conflict   concurrent edits to the same node
//! trellis-flow offline    edits queued while disconnected, replayed on reconnect
//! trellis-flow undo       cascading delete and batch undo/redo
//! ```

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::*;
use trellis_sdk::prelude::*;
use trellis_sdk::{ClientConfigBuilder, Snapshot, SyncConfigBuilder};

// ─── CLI ───────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "trellis-flow")]
#[command(about = "Collaborative diagram editing walkthrough (Trellis SDK)")]
#[command(version)]
struct Cli {
    /// Show sync-layer logs (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Basic demo: two editors share the starter diagram and converge
    Demo,
    /// Conflict scenario: concurrent edits resolve the same way everywhere
    Conflict,
    /// Offline editing: queue while disconnected, replay exactly once
    Offline {
        /// Number of edits made while offline
        #[arg(short, long, default_value_t = 10)]
        edits: usize,
    },
    /// Undo/redo of a cascading delete
    Undo,
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("trellis_sdk=debug,trellis_db=debug,warn")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

// ─── Room setup ────────────────────────────────────────────────────────────

const ROOM: &str = "diagram";
const TOKEN: &str = "let-me-in";

struct Room {
    relay: MemoryRelay,
    authority: Arc<MemoryRoomAuthority>,
}

impl Room {
    fn new() -> Self {
        Self {
            relay: MemoryRelay::new(),
            authority: Arc::new(MemoryRoomAuthority::new().with_room(ROOM, TOKEN)),
        }
    }

    async fn join(&self, user: &str) -> Result<(Client, Arc<Session>), SdkError> {
        let sync = SyncConfigBuilder::new().backoff(10, 200).build();
        let config = ClientConfigBuilder::new().user_name(user).sync(sync).build();
        let client = Client::with_memory_relay(config, self.relay.clone(), self.authority.clone());
        let session = client.join_room(ROOM, &Credentials::token(TOKEN)).await?;
        wait_for(|| session.status() == SyncStatus::Online).await;
        Ok((client, session))
    }
}

/// Give the relay time to deliver until `done` holds (or about two seconds).
async fn wait_for(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

async fn settle(sessions: &[&Arc<Session>]) -> bool {
    wait_for(|| {
        let first = sessions[0].graph().snapshot();
        sessions.iter().all(|s| s.pending() == 0 && s.graph().snapshot() == first)
    })
    .await
}

// ─── Pretty printing ──────────────────────────────────────────────────────

fn header(text: &str) {
    let bar = "═".repeat(60);
    println!("\n{}", bar.bright_cyan());
    println!("  {}", text.bold().bright_white());
    println!("{}", bar.bright_cyan());
}

fn section(text: &str) {
    println!("\n{} {}", "▸".bright_yellow(), text.bold());
}

fn step(text: &str) {
    println!("  {} {}", "•".bright_green(), text);
}

fn show_graph(name: &str, snapshot: &Snapshot) {
    let border = "─".repeat(50);
    println!("  ┌{}┐", border);
    println!("  │ {:^48} │", format!("{}'s view", name).bright_yellow().to_string());
    println!("  ├{}┤", border);

    if snapshot.is_empty() {
        println!("  │ {:^48} │", "(empty diagram)".dimmed().to_string());
    }
    for node in snapshot.nodes.values() {
        let line = format!(
            "node {:<4} {:<8} at ({:>6.1}, {:>6.1})  {}x{}",
            node.id, node.label, node.position.x, node.position.y, node.size.width, node.size.height
        );
        println!("  │ {:<48} │", line);
    }
    for edge in snapshot.edges.values() {
        let line = format!("edge {:<8} {} ──▶ {}", edge.id, edge.source, edge.target);
        println!("  │ {:<48} │", line);
    }
    println!("  └{}┘", border);
}

fn convergence_result(converged: bool) {
    if converged {
        println!(
            "\n  {} {}",
            "✓".bright_green().bold(),
            "ALL EDITORS CONVERGED, diagrams are identical".bright_green().bold()
        );
    } else {
        println!(
            "\n  {} {}",
            "✗".bright_red().bold(),
            "DIVERGENCE DETECTED, diagrams differ".bright_red().bold()
        );
    }
}

// ─── Demo ──────────────────────────────────────────────────────────────────

async fn run_demo() -> Result<(), SdkError> {
    header("DEMO: Shared Diagram Between Two Editors");

    let room = Room::new();
    let (alice_client, alice) = room.join("alice").await?;
    let (bob_client, bob) = room.join("bob").await?;
    step(&format!("alice joined as {}", alice.client_id()));
    step(&format!("bob   joined as {}", bob.client_id()));

    section("Phase 1: alice loads the starter diagram");
    alice.graph().seed()?;
    settle(&[&alice, &bob]).await;
    show_graph("bob", &bob.graph().snapshot());

    section("Phase 2: both edit at the same time");
    alice.graph().mutate(Intent::AddEdge(Edge::new("e2-3", "2", "3")))?;
    step("alice: connect B ──▶ C");
    bob.graph().mutate(Intent::MoveNode {
        id: "4".into(),
        position: Position::new(-150.0, 125.0),
    })?;
    step("bob:   move D to (-150, 125)");
    bob.graph().mutate(Intent::RenameNode {
        id: "3".into(),
        label: "Check".into(),
    })?;
    step("bob:   rename C to \"Check\"");

    section("Phase 3: after sync");
    let ok = settle(&[&alice, &bob]).await;
    show_graph("alice", &alice.graph().snapshot());
    show_graph("bob", &bob.graph().snapshot());
    convergence_result(ok);

    alice_client.shutdown().await;
    bob_client.shutdown().await;
    Ok(())
}

// ─── Conflict ──────────────────────────────────────────────────────────────

async fn run_conflict() -> Result<(), SdkError> {
    header("CONFLICT: Concurrent Edits to the Same Node");

    let room = Room::new();
    let (alice_client, alice) = room.join("alice").await?;
    let (bob_client, bob) = room.join("bob").await?;
    let (carol_client, carol) = room.join("carol").await?;

    section("Phase 1: alice adds node 5 at (10, 10)");
    alice.graph().mutate(Intent::AddNode(Node::new("5", Position::new(10.0, 10.0), "")))?;
    settle(&[&alice, &bob, &carol]).await;

    section("Phase 2: bob renames it while carol moves it and alice renames it too");
    bob.graph().mutate(Intent::RenameNode {
        id: "5".into(),
        label: "E".into(),
    })?;
    carol.graph().mutate(Intent::MoveNode {
        id: "5".into(),
        position: Position::new(40.0, 10.0),
    })?;
    alice.graph().mutate(Intent::RenameNode {
        id: "5".into(),
        label: "Five".into(),
    })?;
    step("each field keeps the write with the highest (clock, client) stamp");

    section("Phase 3: resolved");
    let ok = settle(&[&alice, &bob, &carol]).await;
    show_graph("alice", &alice.graph().snapshot());
    show_graph("carol", &carol.graph().snapshot());
    convergence_result(ok);

    section("Phase 4: a late joiner catches up from its peers");
    let (dave_client, dave) = room.join("dave").await?;
    let ok = settle(&[&alice, &dave]).await;
    show_graph("dave", &dave.graph().snapshot());
    convergence_result(ok);

    for client in [&alice_client, &bob_client, &carol_client, &dave_client] {
        client.shutdown().await;
    }
    Ok(())
}

// ─── Offline ───────────────────────────────────────────────────────────────

async fn run_offline(edits: usize) -> Result<(), SdkError> {
    header("OFFLINE: Queue While Disconnected, Replay on Reconnect");

    let room = Room::new();
    let (alice_client, alice) = room.join("alice").await?;
    let (bob_client, bob) = room.join("bob").await?;
    alice.graph().seed()?;
    settle(&[&alice, &bob]).await;
    let baseline = bob.graph().operation_count();

    section("Phase 1: alice loses her connection");
    room.relay.set_peer_online(alice.client_id(), false);
    wait_for(|| alice.status() != SyncStatus::Online).await;
    step(&format!("alice status: {:?}", alice.status()));

    section(&format!("Phase 2: alice keeps editing ({} moves)", edits));
    for i in 0..edits {
        alice.graph().mutate(Intent::MoveNode {
            id: "2".into(),
            position: Position::new(125.0 + i as f64 * 5.0, 125.0),
        })?;
    }
    step(&format!("queued operations: {}", alice.pending()));
    let x = bob.graph().snapshot().node("2").map(|n| n.position.x).unwrap_or_default();
    step(&format!("bob still sees B at x = {}", x));

    section("Phase 3: connection restored");
    room.relay.set_peer_online(alice.client_id(), true);
    let ok = settle(&[&alice, &bob]).await;
    let delivered = bob.graph().operation_count() - baseline;
    step(&format!("bob applied {} new operations (expected {})", delivered, edits));
    show_graph("bob", &bob.graph().snapshot());
    convergence_result(ok && delivered == edits);

    alice_client.shutdown().await;
    bob_client.shutdown().await;
    Ok(())
}

// ─── Undo ──────────────────────────────────────────────────────────────────

async fn run_undo() -> Result<(), SdkError> {
    header("UNDO: Cascading Delete, Undone as One Batch");

    let room = Room::new();
    let (alice_client, alice) = room.join("alice").await?;
    let (bob_client, bob) = room.join("bob").await?;
    alice.graph().seed()?;
    settle(&[&alice, &bob]).await;

    section("Phase 1: alice deletes node A (and with it edge e1-2)");
    let diff = alice.graph().mutate(Intent::DeleteNode { id: "1".into() })?;
    step(&format!("{} nodes and {} edges removed", diff.nodes.len(), diff.edges.len()));
    settle(&[&alice, &bob]).await;
    show_graph("bob", &bob.graph().snapshot());

    section("Phase 2: alice undoes");
    alice.graph().undo()?;
    let ok = settle(&[&alice, &bob]).await;
    show_graph("bob", &bob.graph().snapshot());
    convergence_result(ok);

    section("Phase 3: alice redoes");
    alice.graph().redo()?;
    let ok = settle(&[&alice, &bob]).await;
    show_graph("bob", &bob.graph().snapshot());
    convergence_result(ok);

    alice_client.shutdown().await;
    bob_client.shutdown().await;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Demo => run_demo().await,
        Commands::Conflict => run_conflict().await,
        Commands::Offline { edits } => run_offline(edits).await,
        Commands::Undo => run_undo().await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "error:".bright_red().bold(), e);
        std::process::exit(1);
    }
}
