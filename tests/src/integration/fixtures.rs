//! Shared setup for cluster scenarios.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use node_runtime::{ClusterNode, InMemoryCluster, NodeConfig};
use shared_bus::{EventListener, ListenerError, TxEvent, Verdict};
use shared_types::NodeId;

/// Remote round-trip bound used by every scenario.
pub const REMOTE_TIMEOUT_MS: u64 = 200;

/// Upper bound on any single scenario step.
pub const STEP: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.events.remote_timeout_ms = REMOTE_TIMEOUT_MS;
    config
}

/// Start `count` nodes numbered from zero on one cluster.
pub fn cluster(count: u32) -> (Arc<InMemoryCluster>, Vec<Arc<ClusterNode>>) {
    init_tracing();
    let (cluster, nodes) =
        ClusterNode::launch(&config(), (0..count).map(NodeId::new)).expect("valid config");
    (cluster, nodes.into_iter().map(Arc::new).collect())
}

/// Vetoes every transaction started without a label.
pub fn require_label(event: &TxEvent) -> Result<Verdict, ListenerError> {
    if event.label().is_none() {
        Ok(Verdict::veto("label required"))
    } else {
        Ok(Verdict::allow())
    }
}

/// Listener wrapper counting invocations.
pub struct Counting<F> {
    pub calls: Arc<AtomicUsize>,
    inner: F,
}

impl<F> Counting<F>
where
    F: Fn(&TxEvent) -> Result<Verdict, ListenerError> + Send + Sync + 'static,
{
    pub fn new(inner: F) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                calls: calls.clone(),
                inner,
            },
            calls,
        )
    }
}

impl<F> EventListener for Counting<F>
where
    F: Fn(&TxEvent) -> Result<Verdict, ListenerError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &TxEvent) -> Result<Verdict, ListenerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.inner)(event)
    }
}

pub fn calls(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
