//! Driving Ports (API - Inbound)

use crate::error::TxResult;
use crate::service::{TxHandle, TxStats};
use async_trait::async_trait;

/// Primary transaction API
///
/// Commit, rollback and data access are on the returned `TxHandle`.
#[async_trait]
pub trait TransactionApi: Send + Sync {
    /// Start a transaction, optionally labeled.
    ///
    /// Returns only after the start event has been dispatched on this node
    /// and to every remote owner observing it.
    async fn start(&self, label: Option<String>) -> TxResult<TxHandle>;

    /// Transactions started here that have not reached a terminal state.
    fn active_count(&self) -> usize;

    /// Lifetime counters.
    fn stats(&self) -> TxStats;
}
