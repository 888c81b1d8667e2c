//! Driven Ports (SPI - Outbound Dependencies)

use crate::domain::WriteSet;
use async_trait::async_trait;
use shared_bus::{BusError, DispatchOutcome, TxEvent};
use shared_types::{NodeId, StorageError, TxId};

/// Storage engine that physically applies a commit.
///
/// Only called after the rollback guard check has passed.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Apply the write set of a transaction.
    async fn finalize_commit(&self, tx_id: TxId, writes: WriteSet) -> Result<(), StorageError>;

    /// Read committed data.
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
}

/// Event delivery used by the transaction manager.
///
/// `dispatch` must not return before every local and remote listener has
/// answered.
#[async_trait]
pub trait EventDispatcher: Send + Sync {
    /// Node the dispatcher publishes from.
    fn node_id(&self) -> NodeId;

    /// Dispatch a vetoable event and report the outcome.
    async fn dispatch(&self, event: &TxEvent) -> Result<DispatchOutcome, BusError>;

    /// Dispatch a notification-only event, best effort.
    async fn notify(&self, event: &TxEvent);
}
