//! Error types for the transaction coordinator

use crate::domain::{TxState, VetoReason};
use shared_bus::BusError;
use shared_types::{StorageError, TxId};
use thiserror::Error;

/// Transaction coordinator errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TxError {
    /// Label present but unusable. Raised before any state exists.
    #[error("Invalid transaction label: {reason}")]
    InvalidLabel { reason: &'static str },

    /// Start-event dispatch broke (listener error, remote timeout or
    /// unreachable node). Not a veto.
    #[error("Start event dispatch failed for transaction {tx_id}: {source}")]
    DispatchFailure {
        tx_id: TxId,
        #[source]
        source: BusError,
    },

    /// The transaction was vetoed or rolled back and can no longer commit.
    #[error("Transaction {tx_id} has been rolled back ({})", describe(.reason))]
    TransactionRollback {
        tx_id: TxId,
        reason: Option<VetoReason>,
    },

    /// Guard check passed but the storage engine refused the commit.
    #[error("Storage commit failed for transaction {tx_id}: {source}")]
    StorageCommit {
        tx_id: TxId,
        #[source]
        source: StorageError,
    },

    /// Operation not allowed in the transaction's current state.
    #[error("Cannot {operation} transaction {tx_id} in state {state:?}")]
    InvalidState {
        tx_id: TxId,
        state: TxState,
        operation: &'static str,
    },
}

fn describe(reason: &Option<VetoReason>) -> String {
    match reason {
        Some(reason) => reason.to_string(),
        None => "no reason recorded".to_string(),
    }
}

impl TxError {
    /// Whether this is the rollback error raised for a vetoed commit.
    pub fn is_rollback(&self) -> bool {
        matches!(self, TxError::TransactionRollback { .. })
    }
}

/// Result type for coordinator operations
pub type TxResult<T> = Result<T, TxError>;
