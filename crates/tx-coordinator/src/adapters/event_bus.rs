//! `EventDispatcher` over the shared event bus

use crate::ports::outbound::EventDispatcher;
use async_trait::async_trait;
use shared_bus::{BusError, DispatchOutcome, EventBus, TxEvent};
use shared_types::NodeId;

#[async_trait]
impl EventDispatcher for EventBus {
    fn node_id(&self) -> NodeId {
        EventBus::node_id(self)
    }

    async fn dispatch(&self, event: &TxEvent) -> Result<DispatchOutcome, BusError> {
        EventBus::dispatch(self, event).await
    }

    async fn notify(&self, event: &TxEvent) {
        EventBus::notify(self, event).await
    }
}
