//! # Core Domain Entities
//!
//! Identifiers shared by every node in the cluster.
//!
//! ## Clusters
//!
//! - **Cluster**: `NodeId`, `Targets`
//! - **Transactions**: `TxId`, `Timestamp`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

/// Current wall-clock time in milliseconds.
///
/// A clock set before the epoch reads as zero rather than failing.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// CLUSTER A: MEMBERSHIP
// =============================================================================

/// Unique identifier for a node in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a node identifier from its ordinal.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Which nodes a remote registration applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Targets {
    /// Every node known to the membership service at registration time.
    #[default]
    All,
    /// An explicit set of nodes.
    Nodes(Vec<NodeId>),
}

impl Targets {
    /// Targets built from an explicit node list.
    pub fn nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Targets::Nodes(nodes.into_iter().collect())
    }
}

impl From<Option<Vec<NodeId>>> for Targets {
    fn from(nodes: Option<Vec<NodeId>>) -> Self {
        match nodes {
            Some(nodes) => Targets::Nodes(nodes),
            None => Targets::All,
        }
    }
}

// =============================================================================
// CLUSTER B: TRANSACTIONS
// =============================================================================

/// Cluster-unique transaction identifier, one per start attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub Uuid);

impl TxId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
