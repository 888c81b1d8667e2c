//! # Listener Registry
//!
//! Stores listeners keyed by event type, in registration order.
//!
//! Each event type has its own lock, so taking a publish snapshot for one
//! type never blocks registration for another. Snapshots are plain `Vec`
//! clones: a registration added or removed while a round is in flight does
//! not change that round.
//!
//! Remote registrations owned by this node are also kept in an ownership
//! table together with the set of nodes where they are still active. A
//! forwarded `Deliver` is served from that table.

use crate::events::{EventFilter, EventType, TxEvent};
use crate::listener::{EventListener, ListenerError, ListenerId, ListenerScope, Verdict};
use parking_lot::{Mutex, RwLock};
use shared_types::NodeId;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

/// A registered listener.
pub struct ListenerEntry {
    id: ListenerId,
    scope: ListenerScope,
    filter: EventFilter,
    listener: Arc<dyn EventListener>,
    /// Set once the listener asked to stop on this node.
    locally_retired: AtomicBool,
}

impl ListenerEntry {
    pub(crate) fn new(
        id: ListenerId,
        scope: ListenerScope,
        filter: EventFilter,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self {
            id,
            scope,
            filter,
            listener,
            locally_retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Invoke for an event raised on this node.
    ///
    /// Returns `None` if the listener already retired itself here, which can
    /// happen when it sits in a snapshot taken by a concurrent round.
    pub(crate) fn invoke_local(&self, event: &TxEvent) -> Option<Result<Verdict, ListenerError>> {
        if self.locally_retired.load(Ordering::Acquire) {
            return None;
        }
        Some(self.listener.on_event(event))
    }

    /// Invoke for an event forwarded from another node.
    pub(crate) fn invoke_forwarded(&self, event: &TxEvent) -> Result<Verdict, ListenerError> {
        self.listener.on_event(event)
    }
}

/// What a removed registration still had active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Removed {
    pub scope: ListenerScope,
    /// Remote nodes carrying a mirror that must be told to drop it.
    pub remote_nodes: Vec<NodeId>,
}

struct RemoteOwnership {
    entry: Arc<ListenerEntry>,
    active_nodes: Mutex<BTreeSet<NodeId>>,
}

/// Listener registry for one node.
pub struct ListenerRegistry {
    node: NodeId,
    started: RwLock<Vec<Arc<ListenerEntry>>>,
    committed: RwLock<Vec<Arc<ListenerEntry>>>,
    rolled_back: RwLock<Vec<Arc<ListenerEntry>>>,
    owned_remote: RwLock<HashMap<ListenerId, Arc<RemoteOwnership>>>,
}

impl ListenerRegistry {
    /// Create an empty registry for `node`.
    pub fn new(node: NodeId) -> Self {
        Self {
            node,
            started: RwLock::new(Vec::new()),
            committed: RwLock::new(Vec::new()),
            rolled_back: RwLock::new(Vec::new()),
            owned_remote: RwLock::new(HashMap::new()),
        }
    }

    fn list(&self, event_type: EventType) -> &RwLock<Vec<Arc<ListenerEntry>>> {
        match event_type {
            EventType::TxStarted => &self.started,
            EventType::TxCommitted => &self.committed,
            EventType::TxRolledBack => &self.rolled_back,
        }
    }

    /// Register a listener that runs for events raised on this node.
    pub fn register_local(
        &self,
        filter: EventFilter,
        listener: Arc<dyn EventListener>,
    ) -> ListenerId {
        let entry = Arc::new(ListenerEntry::new(
            ListenerId::generate(),
            ListenerScope::Local,
            filter,
            listener,
        ));
        let id = entry.id;
        self.insert(entry);
        debug!(listener = %id, node = %self.node, "Local listener registered");
        id
    }

    /// Register a remote listener owned by this node, active on `nodes`.
    ///
    /// If this node is one of the targets the listener also runs for local
    /// events, ordered with the local listeners.
    pub fn register_remote(
        &self,
        filter: EventFilter,
        listener: Arc<dyn EventListener>,
        nodes: BTreeSet<NodeId>,
    ) -> ListenerId {
        let entry = Arc::new(ListenerEntry::new(
            ListenerId::generate(),
            ListenerScope::Remote,
            filter,
            listener,
        ));
        let id = entry.id;
        let runs_here = nodes.contains(&self.node);

        self.owned_remote.write().insert(
            id,
            Arc::new(RemoteOwnership {
                entry: entry.clone(),
                active_nodes: Mutex::new(nodes),
            }),
        );
        if runs_here {
            self.insert(entry);
        }
        debug!(listener = %id, node = %self.node, runs_here, "Remote listener registered");
        id
    }

    fn insert(&self, entry: Arc<ListenerEntry>) {
        for event_type in entry.filter.covered() {
            self.list(event_type).write().push(entry.clone());
        }
    }

    fn remove_from_lists(&self, id: ListenerId) -> Option<Arc<ListenerEntry>> {
        let mut found = None;
        for event_type in EventType::ALL_TX {
            let mut list = self.list(event_type).write();
            if let Some(pos) = list.iter().position(|e| e.id == id) {
                found = Some(list.remove(pos));
            }
        }
        found
    }

    /// Stable snapshot of the listeners for an event type, in registration order.
    pub fn snapshot(&self, event_type: EventType) -> Vec<Arc<ListenerEntry>> {
        self.list(event_type).read().clone()
    }

    /// Remove a registration entirely.
    pub fn deregister(&self, id: ListenerId) -> Option<Removed> {
        let local = self.remove_from_lists(id);
        let owned = self.owned_remote.write().remove(&id);

        match (local, owned) {
            (_, Some(ownership)) => {
                ownership.entry.locally_retired.store(true, Ordering::Release);
                let remote_nodes = ownership
                    .active_nodes
                    .lock()
                    .iter()
                    .copied()
                    .filter(|n| *n != self.node)
                    .collect();
                Some(Removed {
                    scope: ListenerScope::Remote,
                    remote_nodes,
                })
            }
            (Some(entry), None) => {
                entry.locally_retired.store(true, Ordering::Release);
                Some(Removed {
                    scope: entry.scope,
                    remote_nodes: Vec::new(),
                })
            }
            (None, None) => None,
        }
    }

    /// The listener asked to stop while handling a local event.
    pub(crate) fn retire_local(&self, entry: &ListenerEntry) {
        entry.locally_retired.store(true, Ordering::Release);
        self.remove_from_lists(entry.id);
        if entry.scope == ListenerScope::Remote {
            self.retire_node(entry.id, self.node);
        }
        debug!(listener = %entry.id, node = %self.node, "Listener retired locally");
    }

    /// Mark a remote listener as no longer active on `node`.
    ///
    /// The ownership record is dropped once no node remains active.
    pub(crate) fn retire_node(&self, id: ListenerId, node: NodeId) {
        let mut owned = self.owned_remote.write();
        let Some(ownership) = owned.get(&id) else {
            return;
        };
        let now_empty = {
            let mut active = ownership.active_nodes.lock();
            active.remove(&node);
            active.is_empty()
        };
        if now_empty {
            owned.remove(&id);
            debug!(listener = %id, "Remote listener inactive on every node, dropped");
        }
    }

    /// Look up a remote listener owned here that is still active on `node`.
    pub(crate) fn owned_for(&self, id: ListenerId, node: NodeId) -> Option<Arc<ListenerEntry>> {
        let owned = self.owned_remote.read();
        let ownership = owned.get(&id)?;
        if ownership.active_nodes.lock().contains(&node) {
            Some(ownership.entry.clone())
        } else {
            None
        }
    }

    /// Nodes where an owned remote listener is still active.
    pub fn active_nodes(&self, id: ListenerId) -> Vec<NodeId> {
        self.owned_remote
            .read()
            .get(&id)
            .map(|o| o.active_nodes.lock().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of listeners registered for an event type on this node.
    pub fn count(&self, event_type: EventType) -> usize {
        self.list(event_type).read().len()
    }

    /// Whether a registration with this id exists on this node.
    pub fn contains(&self, id: ListenerId) -> bool {
        self.owned_remote.read().contains_key(&id)
            || EventType::ALL_TX
                .iter()
                .any(|t| self.list(*t).read().iter().any(|e| e.id == id))
    }
}
