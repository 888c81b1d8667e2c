//! # TxGuard Node Runtime
//!
//! Runs a two-node in-process cluster and walks through the start-event
//! guarantee.
//!
//! ## Startup Sequence
//!
//! 1. Initialize logging (`RUST_LOG`, default `info`)
//! 2. Load configuration from the environment and validate it
//! 3. Start nodes `N` and `N+1` on one in-memory cluster
//! 4. Register a label-checking listener on `N` observing every node
//! 5. Commit a labeled transaction on `N+1`, then show an unlabeled one
//!    rolled back
//! 6. Shut down

use anyhow::{bail, Context, Result};
use shared_bus::{EventType, ListenerError, TxEvent, Verdict};
use shared_types::{NodeId, Targets};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use node_runtime::{ClusterNode, NodeConfig};

fn require_label(event: &TxEvent) -> Result<Verdict, ListenerError> {
    match event.label() {
        Some(_) => Ok(Verdict::allow()),
        None => Ok(Verdict::veto("transaction has no label")),
    }
}

async fn run(config: NodeConfig) -> Result<()> {
    let first = config.node_id;
    let second = NodeId::new(first.0.wrapping_add(1));
    let (_cluster, nodes) =
        ClusterNode::launch(&config, [first, second]).context("failed to start cluster")?;
    let (owner, peer) = (&nodes[0], &nodes[1]);

    let listener = owner
        .events()
        .remote_listen(Targets::All, require_label, &[EventType::TxStarted])
        .await
        .context("failed to register label listener")?;
    info!(node = %owner.node_id(), listener = %listener, "Label listener registered cluster-wide");

    let tx = peer.transactions().with_label("demo").start().await?;
    tx.put(b"greeting".to_vec(), b"hello".to_vec())?;
    tx.commit().await.context("labeled transaction should commit")?;
    info!(node = %peer.node_id(), tx_id = %tx.id(), "Labeled transaction committed");

    let tx = peer.transactions().start().await?;
    match tx.commit().await {
        Err(e) if e.is_rollback() => {
            info!(node = %peer.node_id(), tx_id = %tx.id(), error = %e, "Unlabeled transaction rolled back");
        }
        Err(e) => return Err(e).context("unexpected commit failure"),
        Ok(()) => bail!("unlabeled transaction committed despite the label listener"),
    }

    if !owner.events().stop_listen(listener).await {
        warn!(listener = %listener, "Listener was already gone");
    }
    for node in &nodes {
        info!(node = %node.node_id(), stats = ?node.manager().stats(), "Final counters");
        node.shutdown().await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // Load configuration
    let config = NodeConfig::from_env().context("invalid environment configuration")?;
    config.validate().context("invalid node configuration")?;
    info!(node = %config.node_id, timeout_ms = config.events.remote_timeout_ms, "Configuration loaded");

    run(config).await
}
