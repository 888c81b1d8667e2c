//! Client-facing views of a node's transaction manager and event bus.

use shared_bus::{BusError, EventBus, EventListener, EventType, ListenerId};
use shared_types::Targets;
use tx_coordinator::{TransactionManager, TxHandle, TxResult};

/// Transaction operations of one node.
#[derive(Clone, Copy)]
pub struct Transactions<'a> {
    manager: &'a TransactionManager,
}

impl<'a> Transactions<'a> {
    pub(crate) fn new(manager: &'a TransactionManager) -> Self {
        Self { manager }
    }

    /// Attach a label to the next transaction.
    pub fn with_label(self, label: impl Into<String>) -> LabeledStart<'a> {
        LabeledStart {
            manager: self.manager,
            label: label.into(),
        }
    }

    /// Start an unlabeled transaction.
    pub async fn start(self) -> TxResult<TxHandle> {
        self.manager.start(None).await
    }
}

/// Pending start of a labeled transaction.
pub struct LabeledStart<'a> {
    manager: &'a TransactionManager,
    label: String,
}

impl LabeledStart<'_> {
    /// Start the transaction. An empty label is rejected here.
    pub async fn start(self) -> TxResult<TxHandle> {
        self.manager.start(Some(self.label)).await
    }
}

/// Event operations of one node.
#[derive(Clone, Copy)]
pub struct Events<'a> {
    bus: &'a EventBus,
}

impl<'a> Events<'a> {
    pub(crate) fn new(bus: &'a EventBus) -> Self {
        Self { bus }
    }

    pub fn enable_local(self, types: &[EventType]) {
        self.bus.enable_local(types);
    }

    pub fn disable_local(self, types: &[EventType]) {
        self.bus.disable_local(types);
    }

    pub fn is_enabled(self, event_type: EventType) -> bool {
        self.bus.is_enabled(event_type)
    }

    /// Listen to events raised on this node.
    pub fn local_listen<L: EventListener>(self, listener: L, types: &[EventType]) -> ListenerId {
        self.bus.local_listen(listener, types)
    }

    /// Listen to events raised on `targets`. The listener runs on this node.
    pub async fn remote_listen<L: EventListener>(
        self,
        targets: Targets,
        listener: L,
        types: &[EventType],
    ) -> Result<ListenerId, BusError> {
        self.bus.remote_listen(targets, listener, types).await
    }

    /// Stop a listener registered through this node.
    pub async fn stop_listen(self, id: ListenerId) -> bool {
        self.bus.stop_listen(id).await
    }
}
