//! In-memory storage engine
//!
//! A whole write set is applied under one lock, so readers never see a
//! partial commit.

use crate::domain::WriteSet;
use crate::ports::outbound::StorageEngine;
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use shared_types::{StorageError, TxId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Shared key-value map used as the commit target.
#[derive(Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
    fail_next: Mutex<Option<StorageError>>,
    commits: AtomicU64,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `finalize_commit` fail with `error`.
    pub fn fail_next_commit(&self, error: StorageError) {
        *self.fail_next.lock() = Some(error);
    }

    /// Number of successfully finalized commits.
    pub fn commit_count(&self) -> u64 {
        self.commits.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn finalize_commit(&self, tx_id: TxId, writes: WriteSet) -> Result<(), StorageError> {
        if let Some(error) = self.fail_next.lock().take() {
            return Err(error);
        }

        let count = writes.len();
        self.data.write().extend(writes);
        self.commits.fetch_add(1, Ordering::Relaxed);
        debug!(tx_id = %tx_id, writes = count, "Write set applied");
        Ok(())
    }

    async fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.data.read().get(key).cloned()
    }
}
