//! Ports module for the transaction coordinator

pub mod inbound;
pub mod outbound;

pub use inbound::TransactionApi;
pub use outbound::{EventDispatcher, StorageEngine};
