//! Transaction Manager - Core business logic
//!
//! Owns the per-node transaction lifecycle and enforces start-event vetoes
//! at commit.
//!
//! ## Start
//!
//! 1. Validate the label (empty is rejected, absent is fine).
//! 2. Create the record in `ACTIVE`.
//! 3. Dispatch `TxStarted` through the event bus and wait for the full local
//!    and remote round.
//! 4. Apply a veto, if any, under the record's mutex.
//! 5. Hand the caller a `TxHandle`.
//!
//! Because the handle only exists after step 4, no write and no commit can
//! observe the transaction before its start event was fully dispatched.
//!
//! ## Cancellation
//!
//! A `start` future dropped mid-dispatch rolls its record back and retires
//! it. A `commit` future dropped while storage is finalizing does the same;
//! the transaction never stays in `COMMITTING`.

use crate::domain::{validate_label, TransactionRecord, TxState, VetoReason};
use crate::error::{TxError, TxResult};
use crate::ports::inbound::TransactionApi;
use crate::ports::outbound::{EventDispatcher, StorageEngine};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_bus::TxEvent;
use shared_types::{now_millis, NodeId, TxId};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Transaction manager configuration
#[derive(Clone, Debug)]
pub struct TxConfig {
    /// Publish `TxCommitted` / `TxRolledBack` after each outcome.
    pub notify_outcomes: bool,
}

impl Default for TxConfig {
    fn default() -> Self {
        Self {
            notify_outcomes: true,
        }
    }
}

/// Lifetime counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TxStats {
    pub started: u64,
    pub committed: u64,
    pub rolled_back: u64,
    /// Rollbacks caused by a start-event listener.
    pub vetoed: u64,
    pub dispatch_failures: u64,
}

#[derive(Default)]
struct Counters {
    started: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
    vetoed: AtomicU64,
    dispatch_failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> TxStats {
        TxStats {
            started: self.started.load(Ordering::Relaxed),
            committed: self.committed.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            vetoed: self.vetoed.load(Ordering::Relaxed),
            dispatch_failures: self.dispatch_failures.load(Ordering::Relaxed),
        }
    }
}

type SharedRecord = Arc<Mutex<TransactionRecord>>;

struct ManagerInner {
    config: TxConfig,
    storage: Arc<dyn StorageEngine>,
    dispatcher: Arc<dyn EventDispatcher>,
    active: RwLock<HashMap<TxId, SharedRecord>>,
    counters: Counters,
}

impl ManagerInner {
    fn node(&self) -> NodeId {
        self.dispatcher.node_id()
    }

    fn retire(&self, tx_id: TxId) {
        self.active.write().remove(&tx_id);
    }

    async fn notify(&self, event: TxEvent) {
        if self.config.notify_outcomes {
            self.dispatcher.notify(&event).await;
        }
    }

    /// Retire a transaction rolled back without a caller to await the
    /// notification. The notification is spawned if a runtime is current.
    fn abandon(self: &Arc<Self>, tx_id: TxId, label: Option<String>, origin: NodeId) {
        self.retire(tx_id);
        Counters::bump(&self.counters.rolled_back);

        if !self.config.notify_outcomes {
            return;
        }
        let event = TxEvent::rolled_back(tx_id, label, origin);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let manager = self.clone();
            runtime.spawn(async move {
                manager.dispatcher.notify(&event).await;
            });
        }
    }
}

/// Rolls back and retires a record whose `start` never produced a handle.
struct PendingStart {
    manager: Arc<ManagerInner>,
    tx_id: TxId,
    label: Option<String>,
    record: SharedRecord,
    armed: bool,
}

impl PendingStart {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingStart {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let applied = matches!(
            self.record.lock().apply_veto(VetoReason::client()),
            Ok(true)
        );
        if applied {
            warn!(tx_id = %self.tx_id, "Start cancelled during dispatch, rolled back");
            let origin = self.manager.node();
            self.manager.abandon(self.tx_id, self.label.take(), origin);
        } else {
            self.manager.retire(self.tx_id);
        }
    }
}

/// Fails a commit whose future was dropped before storage answered.
struct PendingCommit<'a> {
    handle: &'a TxHandle,
    armed: bool,
}

impl PendingCommit<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingCommit<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let handle = self.handle;
        handle.record.lock().fail_commit();
        warn!(tx_id = %handle.tx_id, "Commit cancelled before storage finished, rolled back");
        handle
            .manager
            .abandon(handle.tx_id, handle.label.clone(), handle.origin);
    }
}

/// Transaction manager for one node
pub struct TransactionManager {
    inner: Arc<ManagerInner>,
}

impl TransactionManager {
    pub fn new(
        config: TxConfig,
        storage: Arc<dyn StorageEngine>,
        dispatcher: Arc<dyn EventDispatcher>,
    ) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                storage,
                dispatcher,
                active: RwLock::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node()
    }

    /// Start a transaction.
    pub async fn start(&self, label: Option<String>) -> TxResult<TxHandle> {
        let inner = &self.inner;
        let label = validate_label(label)?;
        let node = inner.node();
        let tx_id = TxId::generate();

        let record: SharedRecord = Arc::new(Mutex::new(TransactionRecord::new(
            tx_id,
            label.clone(),
            node,
        )));
        inner.active.write().insert(tx_id, record.clone());
        Counters::bump(&inner.counters.started);
        debug!(tx_id = %tx_id, node = %node, label = ?label, "Transaction created");

        let pending = PendingStart {
            manager: inner.clone(),
            tx_id,
            label: label.clone(),
            record: record.clone(),
            armed: true,
        };
        let event = TxEvent::started(tx_id, label.clone(), node);
        let outcome = match inner.dispatcher.dispatch(&event).await {
            Ok(outcome) => outcome,
            Err(source) => {
                pending.disarm();
                inner.retire(tx_id);
                Counters::bump(&inner.counters.dispatch_failures);
                warn!(tx_id = %tx_id, error = %source, "Start event dispatch failed");
                return Err(TxError::DispatchFailure { tx_id, source });
            }
        };

        if let Some(veto) = outcome.veto {
            let reason = VetoReason::from(veto);
            let applied = record.lock().apply_veto(reason.clone())?;
            if applied {
                inner.retire(tx_id);
                Counters::bump(&inner.counters.vetoed);
                Counters::bump(&inner.counters.rolled_back);
                info!(tx_id = %tx_id, node = %node, reason = %reason, "Transaction vetoed at start");
                inner
                    .notify(TxEvent::rolled_back(tx_id, label.clone(), node))
                    .await;
            }
        } else {
            info!(
                tx_id = %tx_id,
                node = %node,
                label = ?label,
                listeners = outcome.invoked,
                "Transaction started"
            );
        }

        pending.disarm();
        Ok(TxHandle {
            tx_id,
            label,
            origin: node,
            record,
            manager: inner.clone(),
        })
    }

    pub fn active_count(&self) -> usize {
        self.inner.active.read().len()
    }

    pub fn stats(&self) -> TxStats {
        self.inner.counters.snapshot()
    }
}

#[async_trait]
impl TransactionApi for TransactionManager {
    async fn start(&self, label: Option<String>) -> TxResult<TxHandle> {
        TransactionManager::start(self, label).await
    }

    fn active_count(&self) -> usize {
        TransactionManager::active_count(self)
    }

    fn stats(&self) -> TxStats {
        TransactionManager::stats(self)
    }
}

/// Client handle to a started transaction.
///
/// Dropping a handle whose transaction is still `ACTIVE` rolls it back.
pub struct TxHandle {
    tx_id: TxId,
    label: Option<String>,
    origin: NodeId,
    record: SharedRecord,
    manager: Arc<ManagerInner>,
}

impl fmt::Debug for TxHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxHandle")
            .field("tx_id", &self.tx_id)
            .field("label", &self.label)
            .field("origin", &self.origin)
            .field("state", &self.state())
            .finish()
    }
}

impl TxHandle {
    pub fn id(&self) -> TxId {
        self.tx_id
    }

    /// Label supplied at start. Fixed for the transaction's lifetime.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn origin(&self) -> NodeId {
        self.origin
    }

    pub fn state(&self) -> TxState {
        self.record.lock().state()
    }

    pub fn is_vetoed(&self) -> bool {
        self.record.lock().veto_reason().is_some()
    }

    pub fn veto_reason(&self) -> Option<VetoReason> {
        self.record.lock().veto_reason().cloned()
    }

    /// Buffer a write, applied at commit.
    pub fn put(&self, key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> TxResult<()> {
        self.record.lock().buffer_write(key.into(), value.into())
    }

    /// Read through this transaction's own writes, then committed data.
    pub async fn get(&self, key: &[u8]) -> TxResult<Option<Vec<u8>>> {
        {
            let record = self.record.lock();
            record.ensure_readable("read")?;
            if let Some(value) = record.buffered(key) {
                return Ok(Some(value.to_vec()));
            }
        }
        Ok(self.manager.storage.get(key).await)
    }

    /// Commit.
    ///
    /// A vetoed or rolled-back transaction fails with
    /// `TxError::TransactionRollback` without touching storage.
    pub async fn commit(&self) -> TxResult<()> {
        let manager = &self.manager;
        let writes = {
            let mut record = self.record.lock();
            match record.begin_commit() {
                Ok(writes) => writes,
                Err(e) => {
                    debug!(tx_id = %self.tx_id, error = %e, "Commit refused");
                    return Err(e);
                }
            }
        };

        let pending = PendingCommit {
            handle: self,
            armed: true,
        };
        let result = manager.storage.finalize_commit(self.tx_id, writes).await;
        pending.disarm();

        match result {
            Ok(()) => {
                let started_at = {
                    let mut record = self.record.lock();
                    record.finish_commit();
                    record.started_at()
                };
                manager.retire(self.tx_id);
                Counters::bump(&manager.counters.committed);
                info!(
                    tx_id = %self.tx_id,
                    label = ?self.label,
                    elapsed_ms = now_millis().saturating_sub(started_at),
                    "Transaction committed"
                );
                manager
                    .notify(TxEvent::committed(self.tx_id, self.label.clone(), self.origin))
                    .await;
                Ok(())
            }
            Err(source) => {
                self.record.lock().fail_commit();
                manager.retire(self.tx_id);
                Counters::bump(&manager.counters.rolled_back);
                error!(tx_id = %self.tx_id, error = %source, "Storage commit failed");
                manager
                    .notify(TxEvent::rolled_back(self.tx_id, self.label.clone(), self.origin))
                    .await;
                Err(TxError::StorageCommit {
                    tx_id: self.tx_id,
                    source,
                })
            }
        }
    }

    /// Roll back. Idempotent; refused once commit has begun.
    pub async fn rollback(&self) -> TxResult<()> {
        let applied = self.record.lock().apply_veto(VetoReason::client())?;
        if applied {
            self.after_client_rollback().await;
        }
        Ok(())
    }

    async fn after_client_rollback(&self) {
        let manager = &self.manager;
        manager.retire(self.tx_id);
        Counters::bump(&manager.counters.rolled_back);
        info!(tx_id = %self.tx_id, "Transaction rolled back by client");
        manager
            .notify(TxEvent::rolled_back(self.tx_id, self.label.clone(), self.origin))
            .await;
    }
}

impl Drop for TxHandle {
    fn drop(&mut self) {
        let applied = {
            let mut record = self.record.lock();
            record.state() == TxState::Active
                && matches!(record.apply_veto(VetoReason::client()), Ok(true))
        };
        if !applied {
            return;
        }

        debug!(tx_id = %self.tx_id, "Uncommitted transaction closed, rolled back");
        self.manager
            .abandon(self.tx_id, self.label.take(), self.origin);
    }
}
