//! Transaction record and state machine
//!
//! ```text
//! [ACTIVE] ──begin_commit──→ [COMMITTING] ──finish_commit──→ [COMMITTED]
//!    │                            │
//!    │ veto / rollback            │ storage failure
//!    ↓                            ↓
//! [ROLLED_BACK] ←─────────────────┘
//! ```
//!
//! Every transition goes through the owning mutex; the record never hands
//! out `&mut` to its state or guard.

use crate::domain::rollback_guard::{RollbackGuard, VetoReason};
use crate::error::{TxError, TxResult};
use shared_types::{now_millis, NodeId, Timestamp, TxId};
use std::collections::BTreeMap;

/// Buffered writes, applied by the storage engine at commit.
pub type WriteSet = BTreeMap<Vec<u8>, Vec<u8>>;

/// Transaction lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TxState {
    Active,
    Committing,
    Committed,
    RolledBack,
}

impl TxState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack)
    }
}

/// Per-transaction state, owned by the transaction manager.
#[derive(Debug)]
pub struct TransactionRecord {
    id: TxId,
    label: Option<String>,
    origin: NodeId,
    started_at: Timestamp,
    state: TxState,
    guard: RollbackGuard,
    writes: WriteSet,
}

impl TransactionRecord {
    pub fn new(id: TxId, label: Option<String>, origin: NodeId) -> Self {
        Self {
            id,
            label,
            origin,
            started_at: now_millis(),
            state: TxState::Active,
            guard: RollbackGuard::new(),
            writes: WriteSet::new(),
        }
    }

    pub fn id(&self) -> TxId {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn started_at(&self) -> Timestamp {
        self.started_at
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn veto_reason(&self) -> Option<&VetoReason> {
        self.guard.reason()
    }

    fn rolled_back_error(&self) -> TxError {
        TxError::TransactionRollback {
            tx_id: self.id,
            reason: self.guard.reason().cloned(),
        }
    }

    fn invalid(&self, operation: &'static str) -> TxError {
        TxError::InvalidState {
            tx_id: self.id,
            state: self.state,
            operation,
        }
    }

    /// Record a veto and roll back.
    ///
    /// Returns `Ok(true)` on the transition, `Ok(false)` if already rolled
    /// back. Refused once commit has passed its prologue.
    pub fn apply_veto(&mut self, reason: VetoReason) -> TxResult<bool> {
        match self.state {
            TxState::Active => {
                self.guard
                    .veto(reason)
                    .map_err(|_| self.invalid("roll back"))?;
                self.state = TxState::RolledBack;
                self.writes.clear();
                Ok(true)
            }
            TxState::RolledBack => Ok(false),
            TxState::Committing | TxState::Committed => Err(self.invalid("roll back")),
        }
    }

    /// Commit prologue: one atomic guard check, then COMMITTING.
    ///
    /// Hands back the write set for the storage engine.
    pub fn begin_commit(&mut self) -> TxResult<WriteSet> {
        match self.state {
            TxState::Active => {}
            TxState::RolledBack => return Err(self.rolled_back_error()),
            TxState::Committing | TxState::Committed => return Err(self.invalid("commit")),
        }

        if self.guard.check_and_lock().is_err() {
            self.state = TxState::RolledBack;
            return Err(self.rolled_back_error());
        }
        self.state = TxState::Committing;
        Ok(std::mem::take(&mut self.writes))
    }

    /// Storage finalized the commit.
    pub fn finish_commit(&mut self) {
        debug_assert_eq!(self.state, TxState::Committing);
        self.state = TxState::Committed;
    }

    /// Storage refused the commit.
    pub fn fail_commit(&mut self) {
        debug_assert_eq!(self.state, TxState::Committing);
        self.state = TxState::RolledBack;
    }

    /// Buffer a write. Fails eagerly once the transaction is rolled back.
    pub fn buffer_write(&mut self, key: Vec<u8>, value: Vec<u8>) -> TxResult<()> {
        self.ensure_readable("write")?;
        self.writes.insert(key, value);
        Ok(())
    }

    /// Value written by this transaction, if any.
    pub fn buffered(&self, key: &[u8]) -> Option<&[u8]> {
        self.writes.get(key).map(Vec::as_slice)
    }

    /// Fail unless the transaction still accepts operations.
    pub fn ensure_readable(&self, operation: &'static str) -> TxResult<()> {
        match self.state {
            TxState::Active => Ok(()),
            TxState::RolledBack => Err(self.rolled_back_error()),
            TxState::Committing | TxState::Committed => Err(self.invalid(operation)),
        }
    }
}
