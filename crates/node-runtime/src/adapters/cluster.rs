//! # In-Process Cluster
//!
//! Implements the bus's `ClusterTransport` and `ClusterMembership` ports for
//! nodes running in one process.
//!
//! ```text
//! ┌──────────┐  request()   ┌──────────────────┐  mpsc   ┌────────────────────┐
//! │ EventBus │ ───────────→ │ InMemoryCluster  │ ──────→ │ inbound task of    │
//! │ (node R) │              │ bincode envelope │         │ node L             │
//! │          │ ←── reply ── │                  │ ←─────  │ bus.handle_message │
//! └──────────┘              └──────────────────┘ oneshot └────────────────────┘
//! ```
//!
//! Every message crosses the channel encoded, so anything a listener sees on
//! a remote node went through the same codec a network transport would use.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_bus::remote::{decode, encode};
use shared_bus::{
    ClusterMembership, ClusterMessage, ClusterReply, ClusterTransport, EventBus, TransportError,
    PROTOCOL_VERSION,
};
use shared_types::NodeId;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Inbound queue depth per node.
const INBOUND_CAPACITY: usize = 256;

struct Envelope {
    from: NodeId,
    version: u16,
    payload: Vec<u8>,
    reply: oneshot::Sender<Vec<u8>>,
}

struct NodeLink {
    sender: mpsc::Sender<Envelope>,
    latency_ms: AtomicU64,
    isolated: AtomicBool,
}

impl NodeLink {
    fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms.load(Ordering::Relaxed))
    }

    fn is_isolated(&self) -> bool {
        self.isolated.load(Ordering::Relaxed)
    }
}

/// Cluster of nodes connected through in-memory channels.
#[derive(Default)]
pub struct InMemoryCluster {
    links: RwLock<BTreeMap<NodeId, Arc<NodeLink>>>,
}

impl InMemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a node and start serving its inbound traffic with `bus`.
    ///
    /// Re-attaching a node replaces its previous link; the old inbound task
    /// ends once its queue drains. Must be called inside a tokio runtime.
    pub fn attach(&self, node: NodeId, bus: Arc<EventBus>) -> JoinHandle<()> {
        let (sender, mut inbound) = mpsc::channel::<Envelope>(INBOUND_CAPACITY);
        let link = Arc::new(NodeLink {
            sender,
            latency_ms: AtomicU64::new(0),
            isolated: AtomicBool::new(false),
        });
        self.links.write().insert(node, link.clone());
        info!(node = %node, "Node joined cluster");

        let weak = Arc::downgrade(&link);
        drop(link);

        tokio::spawn(async move {
            while let Some(envelope) = inbound.recv().await {
                let delay = weak.upgrade().map(|l| l.latency()).unwrap_or_default();
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                serve(node, &bus, envelope);
            }
            debug!(node = %node, "Inbound task stopped");
        })
    }

    /// Remove a node. Its inbound task stops; later requests to it fail
    /// with `Unreachable`.
    pub fn detach(&self, node: NodeId) -> bool {
        let removed = self.links.write().remove(&node).is_some();
        if removed {
            info!(node = %node, "Node left cluster");
        }
        removed
    }

    /// Delay every inbound message of `node` by `latency`.
    pub fn set_latency(&self, node: NodeId, latency: Duration) {
        if let Some(link) = self.link(node) {
            let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
            link.latency_ms.store(ms, Ordering::Relaxed);
        }
    }

    /// Cut `node` off. Requests to or from it fail with `Unreachable`.
    pub fn isolate(&self, node: NodeId) {
        if let Some(link) = self.link(node) {
            link.isolated.store(true, Ordering::Relaxed);
            warn!(node = %node, "Node isolated");
        }
    }

    /// Undo `isolate`.
    pub fn heal(&self, node: NodeId) {
        if let Some(link) = self.link(node) {
            link.isolated.store(false, Ordering::Relaxed);
            info!(node = %node, "Node reconnected");
        }
    }

    pub fn len(&self) -> usize {
        self.links.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.read().is_empty()
    }

    fn link(&self, node: NodeId) -> Option<Arc<NodeLink>> {
        self.links.read().get(&node).cloned()
    }
}

fn serve(node: NodeId, bus: &EventBus, envelope: Envelope) {
    if envelope.version != PROTOCOL_VERSION {
        warn!(
            node = %node,
            from = %envelope.from,
            version = envelope.version,
            "Dropping message with unsupported protocol version"
        );
        return;
    }

    let message: ClusterMessage = match decode(&envelope.payload) {
        Ok(message) => message,
        Err(e) => {
            warn!(node = %node, from = %envelope.from, error = %e, "Dropping undecodable message");
            return;
        }
    };

    // A panicking predicate fails this request only; the task keeps serving.
    let from = envelope.from;
    let reply = match catch_unwind(AssertUnwindSafe(|| bus.handle_message(from, message))) {
        Ok(reply) => reply,
        Err(_) => {
            error!(node = %node, from = %from, "Listener panicked while handling request");
            ClusterReply::ListenerFailed("listener panicked".into())
        }
    };
    match encode(&reply) {
        Ok(bytes) => {
            if envelope.reply.send(bytes).is_err() {
                debug!(node = %node, from = %envelope.from, "Requester gave up before reply");
            }
        }
        Err(e) => warn!(node = %node, error = %e, "Failed to encode reply"),
    }
}

impl ClusterMembership for InMemoryCluster {
    fn list_nodes(&self) -> Vec<NodeId> {
        self.links.read().keys().copied().collect()
    }
}

#[async_trait]
impl ClusterTransport for InMemoryCluster {
    async fn request(
        &self,
        from: NodeId,
        target: NodeId,
        message: ClusterMessage,
    ) -> Result<ClusterReply, TransportError> {
        let source_cut = self.link(from).is_some_and(|l| l.is_isolated());
        let link = match self.link(target) {
            Some(link) if !link.is_isolated() && !source_cut => link,
            _ => return Err(TransportError::Unreachable(target)),
        };

        let (reply, response) = oneshot::channel();
        let envelope = Envelope {
            from,
            version: PROTOCOL_VERSION,
            payload: encode(&message)?,
            reply,
        };
        link.sender
            .send(envelope)
            .await
            .map_err(|_| TransportError::Closed(target))?;
        drop(link);

        let bytes = response.await.map_err(|_| TransportError::Closed(target))?;
        decode(&bytes)
    }
}
