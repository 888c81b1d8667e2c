//! Transaction label validation
//!
//! Absent and empty are different states: `None` is always accepted, an
//! empty string is always rejected, and neither is coerced into the other.

use crate::error::{TxError, TxResult};

/// Message carried by `TxError::InvalidLabel` for an empty label.
pub const EMPTY_LABEL: &str = "label should not be empty.";

/// Validate a label supplied to `start`.
pub fn validate_label(label: Option<String>) -> TxResult<Option<String>> {
    match label {
        Some(label) if label.is_empty() => Err(TxError::InvalidLabel {
            reason: EMPTY_LABEL,
        }),
        other => Ok(other),
    }
}
