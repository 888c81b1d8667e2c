//! # Remote Propagation
//!
//! Wire messages, outbound ports and the mirror table used for cluster-wide
//! listeners.
//!
//! ```text
//! Node L (owner)                         Node R (event origin)
//!   remote_listen() ──Subscribe──────────→ RemoteSubscriptions.install()
//!                   ←────────────Ack──────
//!
//!                   ←──Deliver(event)───── publish_cluster_wide()
//!   predicate runs  ───Verdict───────────→ veto applied before start() returns
//! ```

use crate::events::{EventFilter, EventType, TxEvent};
use crate::listener::{ListenerId, Verdict};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shared_types::{NodeId, Targets};
use thiserror::Error;
use tracing::debug;

/// Request sent between nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMessage {
    /// Install a mirror of a remote listener on the receiver.
    Subscribe {
        listener_id: ListenerId,
        origin: NodeId,
        event_types: Vec<EventType>,
    },
    /// Drop a mirror from the receiver.
    Unsubscribe { listener_id: ListenerId },
    /// Run the owner's predicate against an event raised on the sender.
    Deliver {
        listener_id: ListenerId,
        event: TxEvent,
    },
}

/// Reply to a `ClusterMessage`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterReply {
    Ack,
    Verdict(Verdict),
    /// The predicate raised an error.
    ListenerFailed(String),
    /// The owner no longer serves this listener for the sender.
    UnknownListener,
}

/// Errors from the cluster transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// No route to the node.
    #[error("Node {0} unreachable")]
    Unreachable(NodeId),

    /// The node did not answer in time.
    #[error("Node {node} did not answer within {after_ms}ms")]
    Timeout { node: NodeId, after_ms: u64 },

    /// The node dropped the request without replying.
    #[error("Node {0} closed the request")]
    Closed(NodeId),

    /// Encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Encode a wire value.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, TransportError> {
    bincode::serialize(value).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Decode a wire value.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, TransportError> {
    bincode::deserialize(bytes).map_err(|e| TransportError::Codec(e.to_string()))
}

/// Request/reply transport between cluster nodes.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    /// Send `message` from `from` to `target` and wait for the reply.
    ///
    /// The caller bounds the wait; implementations need not time out.
    async fn request(
        &self,
        from: NodeId,
        target: NodeId,
        message: ClusterMessage,
    ) -> Result<ClusterReply, TransportError>;
}

/// Cluster membership service.
pub trait ClusterMembership: Send + Sync {
    /// All known nodes.
    fn list_nodes(&self) -> Vec<NodeId>;

    /// Resolve targets to concrete nodes, sorted and deduplicated.
    fn resolve_targets(&self, targets: &Targets) -> Vec<NodeId> {
        let mut nodes = match targets {
            Targets::All => self.list_nodes(),
            Targets::Nodes(nodes) => nodes.clone(),
        };
        nodes.sort();
        nodes.dedup();
        nodes
    }
}

/// Membership and transport for a node running without peers.
#[derive(Debug, Clone, Copy)]
pub struct Standalone {
    node: NodeId,
}

impl Standalone {
    pub fn new(node: NodeId) -> Self {
        Self { node }
    }
}

impl ClusterMembership for Standalone {
    fn list_nodes(&self) -> Vec<NodeId> {
        vec![self.node]
    }
}

#[async_trait]
impl ClusterTransport for Standalone {
    async fn request(
        &self,
        _from: NodeId,
        target: NodeId,
        _message: ClusterMessage,
    ) -> Result<ClusterReply, TransportError> {
        Err(TransportError::Unreachable(target))
    }
}

/// A mirror of a listener owned by another node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteSubscription {
    pub listener_id: ListenerId,
    pub origin: NodeId,
    pub filter: EventFilter,
}

/// Mirrors installed on this node, in installation order.
#[derive(Default)]
pub struct RemoteSubscriptions {
    entries: RwLock<Vec<RemoteSubscription>>,
}

impl RemoteSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a mirror. Re-installing the same listener replaces its filter
    /// and keeps its position.
    pub fn install(&self, subscription: RemoteSubscription) {
        let mut entries = self.entries.write();
        match entries
            .iter_mut()
            .find(|s| s.listener_id == subscription.listener_id)
        {
            Some(existing) => *existing = subscription,
            None => {
                debug!(
                    listener = %subscription.listener_id,
                    origin = %subscription.origin,
                    "Remote mirror installed"
                );
                entries.push(subscription);
            }
        }
    }

    /// Remove a mirror. Returns whether it was present.
    pub fn remove(&self, listener_id: ListenerId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|s| s.listener_id != listener_id);
        before != entries.len()
    }

    /// Mirrors covering an event type, in installation order.
    pub fn snapshot(&self, event_type: EventType) -> Vec<RemoteSubscription> {
        self.entries
            .read()
            .iter()
            .filter(|s| s.filter.contains(event_type))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
