//! # Event Publisher
//!
//! The per-node event bus: enablement, registration and dispatch.
//!
//! Dispatch of one event is a local round followed by a remote round:
//!
//! 1. `publish_local` runs every listener registered on this node for the
//!    event type, synchronously and in registration order.
//! 2. `publish_cluster_wide` forwards the event to the owner of every mirror
//!    installed here and waits for each verdict, bounded by
//!    `remote_timeout_ms`.
//!
//! A listener error or a remote leg that fails to confirm stops dispatch and
//! is returned as a `BusError`. A veto is not an error; it is reported in the
//! `DispatchOutcome`.

use crate::events::{EventFilter, EventType, TxEvent};
use crate::listener::{Decision, EventListener, ListenerId, Verdict};
use crate::registry::ListenerRegistry;
use crate::remote::{
    ClusterMembership, ClusterMessage, ClusterReply, ClusterTransport, RemoteSubscription,
    RemoteSubscriptions, Standalone, TransportError,
};
use crate::DEFAULT_REMOTE_TIMEOUT_MS;
use parking_lot::RwLock;
use shared_types::{NodeId, Targets};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the event bus.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    /// A listener raised an error instead of returning a verdict.
    #[error("Listener {listener} failed on {node}: {reason}")]
    ListenerFailed {
        listener: ListenerId,
        node: NodeId,
        reason: String,
    },

    /// A remote leg failed to confirm.
    #[error("Remote leg to {node} failed: {source}")]
    Remote {
        node: NodeId,
        #[source]
        source: TransportError,
    },

    /// A node answered with a reply that does not fit the request.
    #[error("Unexpected reply from {node}: {reply}")]
    UnexpectedReply { node: NodeId, reply: String },

    /// A remote registration could not be installed on every target.
    #[error("Remote registration failed on {node}: {reason}")]
    RegistrationFailed { node: NodeId, reason: String },

    /// A remote registration resolved to no nodes.
    #[error("Remote registration has no target nodes")]
    NoTargets,
}

/// The veto recorded during a dispatch round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Veto {
    /// The listener that vetoed.
    pub listener: ListenerId,
    /// The node where the listener ran.
    pub node: NodeId,
    /// The listener's reason.
    pub reason: String,
}

/// Result of a dispatch round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Listener invocations that returned a verdict.
    pub invoked: usize,
    /// First veto seen, if any.
    pub veto: Option<Veto>,
}

impl DispatchOutcome {
    fn record(&mut self, listener: ListenerId, node: NodeId, verdict: &Verdict) {
        self.invoked += 1;
        if let Decision::Veto(reason) = &verdict.decision {
            if self.veto.is_none() {
                self.veto = Some(Veto {
                    listener,
                    node,
                    reason: reason.clone(),
                });
            }
        }
    }

    fn merge(mut self, later: DispatchOutcome) -> Self {
        self.invoked += later.invoked;
        if self.veto.is_none() {
            self.veto = later.veto;
        }
        self
    }

    /// Whether any listener vetoed.
    #[must_use]
    pub fn is_vetoed(&self) -> bool {
        self.veto.is_some()
    }
}

/// Event bus configuration.
#[derive(Clone, Debug)]
pub struct EventBusConfig {
    /// Bound on each remote round trip (milliseconds).
    pub remote_timeout_ms: u64,
    /// Event types enabled at startup.
    pub enabled_events: Vec<EventType>,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            remote_timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            enabled_events: Vec::new(),
        }
    }
}

/// Per-node event bus.
pub struct EventBus {
    node: NodeId,
    config: EventBusConfig,
    registry: ListenerRegistry,
    mirrors: RemoteSubscriptions,
    enabled: RwLock<HashSet<EventType>>,
    transport: Arc<dyn ClusterTransport>,
    membership: Arc<dyn ClusterMembership>,
    events_published: AtomicU64,
}

impl EventBus {
    /// Create a bus for `node` wired to a cluster.
    pub fn new(
        node: NodeId,
        config: EventBusConfig,
        transport: Arc<dyn ClusterTransport>,
        membership: Arc<dyn ClusterMembership>,
    ) -> Self {
        let enabled = config.enabled_events.iter().copied().collect();
        Self {
            node,
            config,
            registry: ListenerRegistry::new(node),
            mirrors: RemoteSubscriptions::new(),
            enabled: RwLock::new(enabled),
            transport,
            membership,
            events_published: AtomicU64::new(0),
        }
    }

    /// Create a bus for a node without peers.
    pub fn standalone(node: NodeId, config: EventBusConfig) -> Self {
        let standalone = Arc::new(Standalone::new(node));
        Self::new(node, config, standalone.clone(), standalone)
    }

    pub fn node_id(&self) -> NodeId {
        self.node
    }

    pub fn config(&self) -> &EventBusConfig {
        &self.config
    }

    // =========================================================================
    // ENABLEMENT
    // =========================================================================

    /// Enable recording of event types on this node.
    pub fn enable_local(&self, types: &[EventType]) {
        self.enabled.write().extend(types.iter().copied());
        debug!(node = %self.node, ?types, "Event types enabled");
    }

    /// Disable recording of event types on this node.
    pub fn disable_local(&self, types: &[EventType]) {
        let mut enabled = self.enabled.write();
        for t in types {
            enabled.remove(t);
        }
        debug!(node = %self.node, ?types, "Event types disabled");
    }

    pub fn is_enabled(&self, event_type: EventType) -> bool {
        self.enabled.read().contains(&event_type)
    }

    // =========================================================================
    // REGISTRATION
    // =========================================================================

    /// Register a listener for events raised on this node.
    ///
    /// The types must be enabled separately with `enable_local`.
    pub fn local_listen<L: EventListener>(&self, listener: L, types: &[EventType]) -> ListenerId {
        self.registry
            .register_local(EventFilter::types(types.iter().copied()), Arc::new(listener))
    }

    /// Register a listener for events raised on every target node.
    ///
    /// Returns once every target other than this node has acknowledged its
    /// mirror. If any target fails, the mirrors already installed are removed
    /// and the registration is discarded.
    pub async fn remote_listen<L: EventListener>(
        &self,
        targets: Targets,
        listener: L,
        types: &[EventType],
    ) -> Result<ListenerId, BusError> {
        let nodes: BTreeSet<NodeId> = self
            .membership
            .resolve_targets(&targets)
            .into_iter()
            .collect();
        if nodes.is_empty() {
            return Err(BusError::NoTargets);
        }

        let filter = EventFilter::types(types.iter().copied());
        let event_types = filter.covered();
        if nodes.contains(&self.node) {
            self.enable_local(&event_types);
        }

        // Ownership goes in first so a Deliver racing the acks resolves.
        let id = self
            .registry
            .register_remote(filter, Arc::new(listener), nodes.clone());

        let mut installed = Vec::new();
        for node in nodes.into_iter().filter(|n| *n != self.node) {
            let message = ClusterMessage::Subscribe {
                listener_id: id,
                origin: self.node,
                event_types: event_types.clone(),
            };
            let failure = match self.request(node, message).await {
                Ok(ClusterReply::Ack) => {
                    installed.push(node);
                    continue;
                }
                Ok(other) => format!("unexpected reply {other:?}"),
                Err(e) => e.to_string(),
            };

            warn!(listener = %id, node = %node, reason = %failure, "Remote registration failed");
            self.registry.deregister(id);
            for done in installed {
                self.send_unsubscribe(id, done).await;
            }
            return Err(BusError::RegistrationFailed {
                node,
                reason: failure,
            });
        }

        info!(listener = %id, node = %self.node, mirrors = self.registry.active_nodes(id).len(), "Remote listener registered");
        Ok(id)
    }

    /// Remove a registration owned by this node.
    ///
    /// Mirrors are told to drop it; a mirror that cannot be reached is
    /// logged and left to answer `UnknownListener` later. Returns whether the
    /// registration existed.
    pub async fn stop_listen(&self, id: ListenerId) -> bool {
        let Some(removed) = self.registry.deregister(id) else {
            return false;
        };
        for node in removed.remote_nodes {
            self.send_unsubscribe(id, node).await;
        }
        debug!(listener = %id, node = %self.node, "Listener stopped");
        true
    }

    async fn send_unsubscribe(&self, id: ListenerId, node: NodeId) {
        let message = ClusterMessage::Unsubscribe { listener_id: id };
        if let Err(e) = self.request(node, message).await {
            warn!(listener = %id, node = %node, error = %e, "Failed to remove remote mirror");
        }
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Run every listener registered on this node for the event, in order.
    pub fn publish_local(&self, event: &TxEvent) -> Result<DispatchOutcome, BusError> {
        let mut outcome = DispatchOutcome::default();

        for entry in self.registry.snapshot(event.event_type) {
            let Some(result) = entry.invoke_local(event) else {
                continue;
            };
            let verdict = result.map_err(|e| BusError::ListenerFailed {
                listener: entry.id(),
                node: self.node,
                reason: e.0,
            })?;

            debug!(
                listener = %entry.id(),
                tx_id = %event.tx_id,
                veto = verdict.is_veto(),
                "Local listener invoked"
            );
            if !verdict.retain {
                self.registry.retire_local(&entry);
            }
            outcome.record(entry.id(), self.node, &verdict);
        }

        Ok(outcome)
    }

    /// Forward the event to the owner of every mirror on this node and wait
    /// for each verdict.
    pub async fn publish_cluster_wide(&self, event: &TxEvent) -> Result<DispatchOutcome, BusError> {
        let mut outcome = DispatchOutcome::default();

        for RemoteSubscription {
            listener_id, origin, ..
        } in self.mirrors.snapshot(event.event_type)
        {
            let message = ClusterMessage::Deliver {
                listener_id,
                event: event.clone(),
            };
            match self.request(origin, message).await? {
                ClusterReply::Verdict(verdict) => {
                    debug!(
                        listener = %listener_id,
                        owner = %origin,
                        tx_id = %event.tx_id,
                        veto = verdict.is_veto(),
                        "Remote listener invoked"
                    );
                    if !verdict.retain {
                        self.mirrors.remove(listener_id);
                    }
                    outcome.record(listener_id, origin, &verdict);
                }
                ClusterReply::ListenerFailed(reason) => {
                    return Err(BusError::ListenerFailed {
                        listener: listener_id,
                        node: origin,
                        reason,
                    });
                }
                ClusterReply::UnknownListener => {
                    debug!(listener = %listener_id, owner = %origin, "Owner dropped listener, removing mirror");
                    self.mirrors.remove(listener_id);
                }
                ClusterReply::Ack => {
                    return Err(BusError::UnexpectedReply {
                        node: origin,
                        reply: "Ack".into(),
                    });
                }
            }
        }

        Ok(outcome)
    }

    /// Full dispatch: local round, then remote round.
    ///
    /// Returns an empty outcome if the event type is not enabled.
    pub async fn dispatch(&self, event: &TxEvent) -> Result<DispatchOutcome, BusError> {
        if !self.is_enabled(event.event_type) {
            return Ok(DispatchOutcome::default());
        }
        self.events_published.fetch_add(1, Ordering::Relaxed);

        let local = self.publish_local(event)?;
        let remote = self.publish_cluster_wide(event).await?;
        Ok(local.merge(remote))
    }

    /// Dispatch a notification-only event.
    ///
    /// Failures are logged, vetoes are ignored.
    pub async fn notify(&self, event: &TxEvent) {
        match self.dispatch(event).await {
            Ok(DispatchOutcome {
                veto: Some(veto), ..
            }) => {
                warn!(
                    tx_id = %event.tx_id,
                    event_type = %event.event_type,
                    listener = %veto.listener,
                    "Veto on notification event ignored"
                );
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    tx_id = %event.tx_id,
                    event_type = %event.event_type,
                    error = %e,
                    "Notification dispatch failed"
                );
            }
        }
    }

    // =========================================================================
    // INBOUND
    // =========================================================================

    /// Serve a message from another node.
    pub fn handle_message(&self, from: NodeId, message: ClusterMessage) -> ClusterReply {
        match message {
            ClusterMessage::Subscribe {
                listener_id,
                origin,
                event_types,
            } => {
                self.enable_local(&event_types);
                self.mirrors.install(RemoteSubscription {
                    listener_id,
                    origin,
                    filter: EventFilter::types(event_types),
                });
                ClusterReply::Ack
            }
            ClusterMessage::Unsubscribe { listener_id } => {
                self.mirrors.remove(listener_id);
                ClusterReply::Ack
            }
            ClusterMessage::Deliver { listener_id, event } => {
                let Some(entry) = self.registry.owned_for(listener_id, from) else {
                    return ClusterReply::UnknownListener;
                };
                match entry.invoke_forwarded(&event) {
                    Ok(verdict) => {
                        if !verdict.retain {
                            self.registry.retire_node(listener_id, from);
                        }
                        ClusterReply::Verdict(verdict)
                    }
                    Err(e) => ClusterReply::ListenerFailed(e.0),
                }
            }
        }
    }

    async fn request(&self, target: NodeId, message: ClusterMessage) -> Result<ClusterReply, BusError> {
        let after_ms = self.config.remote_timeout_ms;
        let pending = self.transport.request(self.node, target, message);
        match tokio::time::timeout(Duration::from_millis(after_ms), pending).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(source)) => Err(BusError::Remote {
                node: target,
                source,
            }),
            Err(_) => Err(BusError::Remote {
                node: target,
                source: TransportError::Timeout {
                    node: target,
                    after_ms,
                },
            }),
        }
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    /// Listeners registered on this node for an event type.
    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.registry.count(event_type)
    }

    /// Whether a registration owned by this node exists.
    pub fn has_listener(&self, id: ListenerId) -> bool {
        self.registry.contains(id)
    }

    /// Mirrors of foreign listeners installed on this node.
    pub fn mirror_count(&self) -> usize {
        self.mirrors.len()
    }

    /// Dispatch rounds run for enabled events.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
