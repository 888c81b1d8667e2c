//! Domain layer for the transaction coordinator

pub mod label;
pub mod rollback_guard;
pub mod transaction;

pub use label::{validate_label, EMPTY_LABEL};
pub use rollback_guard::{GuardError, RollbackGuard, VetoReason, VetoSource};
pub use transaction::{TransactionRecord, TxState, WriteSet};
