//! Rollback Guard
//!
//! Single source of truth for "may this transaction commit".
//!
//! The guard lives inside the transaction record and is only reached through
//! the record's mutex, so `&mut self` methods are the per-transaction
//! single-writer discipline.
//!
//! ```text
//! [OPEN] ──veto──→ [VETOED]          (check_and_lock fails forever)
//!   │
//!   └── check_and_lock ──→ [LOCKED]  (veto refused forever)
//! ```

use shared_bus::{ListenerId, Veto};
use shared_types::NodeId;
use std::fmt;
use thiserror::Error;

/// Who vetoed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VetoSource {
    /// A start-event listener, running on `node`.
    Listener { listener: ListenerId, node: NodeId },
    /// The client called `rollback`.
    Client,
}

/// Recorded veto.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VetoReason {
    pub source: VetoSource,
    pub reason: String,
}

impl VetoReason {
    /// Veto issued by the client.
    pub fn client() -> Self {
        Self {
            source: VetoSource::Client,
            reason: "rolled back by client".to_string(),
        }
    }
}

impl From<Veto> for VetoReason {
    fn from(veto: Veto) -> Self {
        Self {
            source: VetoSource::Listener {
                listener: veto.listener,
                node: veto.node,
            },
            reason: veto.reason,
        }
    }
}

impl fmt::Display for VetoReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            VetoSource::Listener { listener, node } => {
                write!(f, "vetoed by listener {listener} on {node}: {}", self.reason)
            }
            VetoSource::Client => f.write_str(&self.reason),
        }
    }
}

/// Guard state violations
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    /// Commit already passed its prologue.
    #[error("Commit already in progress or complete; veto refused")]
    Locked,
}

/// Veto flag plus commit lock.
#[derive(Debug, Default)]
pub struct RollbackGuard {
    veto: Option<VetoReason>,
    locked: bool,
}

impl RollbackGuard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_vetoed(&self) -> bool {
        self.veto.is_some()
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn reason(&self) -> Option<&VetoReason> {
        self.veto.as_ref()
    }

    /// Record a veto.
    ///
    /// Returns `Ok(true)` if this call set the flag, `Ok(false)` if it was
    /// already set (the first reason is kept).
    pub fn veto(&mut self, reason: VetoReason) -> Result<bool, GuardError> {
        if self.locked {
            return Err(GuardError::Locked);
        }
        if self.veto.is_some() {
            return Ok(false);
        }
        self.veto = Some(reason);
        Ok(true)
    }

    /// Atomically read the veto flag and, if clear, refuse all later vetoes.
    pub fn check_and_lock(&mut self) -> Result<(), VetoReason> {
        if let Some(veto) = &self.veto {
            return Err(veto.clone());
        }
        self.locked = true;
        Ok(())
    }
}
