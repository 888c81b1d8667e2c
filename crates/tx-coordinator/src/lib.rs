//! # Transaction Coordinator
//!
//! Per-node transaction manager. Every transaction may carry a label, its
//! start event is dispatched to local and remote listeners before `start`
//! returns, and any listener veto makes the later commit fail with
//! `TxError::TransactionRollback`.
//!
//! ## Lifecycle
//!
//! ```text
//! start(label) ──validate──→ [ACTIVE] ──dispatch TxStarted──→ handle
//!                                │
//!                                ├── veto ──→ [ROLLED_BACK] ──commit──→ TransactionRollback
//!                                │
//!                                └── commit ──guard check──→ [COMMITTING] ──→ [COMMITTED]
//! ```
//!
//! | Stage | Method | Effect |
//! |-------|--------|--------|
//! | Start | `TransactionManager::start()` | Label checked, start event dispatched, veto applied |
//! | Write | `TxHandle::put()` | Buffered; fails once rolled back |
//! | Commit | `TxHandle::commit()` | Guard checked and locked, then storage finalizes |
//! | Rollback | `TxHandle::rollback()` / drop | Idempotent, refused after the commit prologue |
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  adapters/ - EventBus dispatcher, in-memory storage             │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ implements ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ports/inbound.rs  - TransactionApi                             │
//! │  ports/outbound.rs - StorageEngine, EventDispatcher             │
//! └─────────────────────────────────────────────────────────────────┘
//!                          ↑ uses ↑
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  domain/label.rs          - label validation                    │
//! │  domain/rollback_guard.rs - veto flag and commit lock           │
//! │  domain/transaction.rs    - TransactionRecord, TxState          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod domain;
pub mod error;
pub mod ports;
pub mod service;

pub use adapters::InMemoryStorage;
pub use domain::*;
pub use error::{TxError, TxResult};
pub use ports::{EventDispatcher, StorageEngine, TransactionApi};
pub use service::{TransactionManager, TxConfig, TxHandle, TxStats};
