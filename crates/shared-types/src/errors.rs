//! # Error Types
//!
//! Defines error types shared across crates.

use thiserror::Error;

/// Errors raised by the storage engine while finalizing a commit.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    /// The engine refused the write set.
    #[error("Commit rejected: {0}")]
    Rejected(String),

    /// The engine is not accepting writes.
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
