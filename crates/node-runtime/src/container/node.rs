//! # Cluster Node
//!
//! Holds one node's services and their wiring.
//!
//! ```text
//! ClusterNode
//!   ├── EventBus ───────────── InMemoryCluster (transport + membership)
//!   ├── TransactionManager ─── EventBus (dispatcher), InMemoryStorage
//!   └── inbound task ───────── EventBus::handle_message
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use shared_bus::EventBus;
use shared_types::NodeId;
use tx_coordinator::{InMemoryStorage, TransactionManager};

use crate::adapters::InMemoryCluster;
use crate::container::config::{ConfigError, NodeConfig};
use crate::container::facade::{Events, Transactions};

/// One node: event bus, transaction manager and storage.
pub struct ClusterNode {
    config: NodeConfig,
    bus: Arc<EventBus>,
    manager: TransactionManager,
    storage: Arc<InMemoryStorage>,
    cluster: Option<Arc<InMemoryCluster>>,
    inbound: Mutex<Option<JoinHandle<()>>>,
}

impl ClusterNode {
    /// Start a node and attach it to `cluster`.
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(skip_all, fields(node = %config.node_id))]
    pub fn join(config: NodeConfig, cluster: &Arc<InMemoryCluster>) -> Result<Self, ConfigError> {
        config.validate()?;
        let node = config.node_id;
        let bus = Arc::new(EventBus::new(
            node,
            config.events.clone(),
            cluster.clone(),
            cluster.clone(),
        ));
        let inbound = cluster.attach(node, bus.clone());
        info!(node = %node, "Cluster node started");
        Ok(Self::assemble(config, bus, Some(cluster.clone()), Some(inbound)))
    }

    /// Start a node with no peers.
    pub fn standalone(config: NodeConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let bus = Arc::new(EventBus::standalone(config.node_id, config.events.clone()));
        Ok(Self::assemble(config, bus, None, None))
    }

    fn assemble(
        config: NodeConfig,
        bus: Arc<EventBus>,
        cluster: Option<Arc<InMemoryCluster>>,
        inbound: Option<JoinHandle<()>>,
    ) -> Self {
        let storage = Arc::new(InMemoryStorage::new());
        let manager = TransactionManager::new(
            config.transactions.clone(),
            storage.clone(),
            bus.clone(),
        );
        Self {
            config,
            bus,
            manager,
            storage,
            cluster,
            inbound: Mutex::new(inbound),
        }
    }

    /// Start one node per id in `ids`, sharing `base` settings.
    pub fn launch(
        base: &NodeConfig,
        ids: impl IntoIterator<Item = NodeId>,
    ) -> Result<(Arc<InMemoryCluster>, Vec<ClusterNode>), ConfigError> {
        let cluster = InMemoryCluster::new();
        let nodes = ids
            .into_iter()
            .map(|id| Self::join(base.with_node_id(id), &cluster))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((cluster, nodes))
    }

    pub fn node_id(&self) -> NodeId {
        self.config.node_id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Transaction API of this node.
    pub fn transactions(&self) -> Transactions<'_> {
        Transactions::new(&self.manager)
    }

    /// Event API of this node.
    pub fn events(&self) -> Events<'_> {
        Events::new(&self.bus)
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn manager(&self) -> &TransactionManager {
        &self.manager
    }

    pub fn storage(&self) -> &Arc<InMemoryStorage> {
        &self.storage
    }

    /// Leave the cluster and stop serving inbound traffic.
    pub async fn shutdown(&self) {
        if let Some(cluster) = &self.cluster {
            cluster.detach(self.node_id());
        }
        let inbound = self.inbound.lock().take();
        if let Some(task) = inbound {
            // Detaching closed the queue; the task drains and exits.
            if let Err(e) = task.await {
                warn!(node = %self.node_id(), error = %e, "Inbound task ended abnormally");
            }
        }
        info!(node = %self.node_id(), "Cluster node stopped");
    }
}
