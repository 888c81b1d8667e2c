//! Adapters connecting the coordinator ports to concrete implementations

pub mod event_bus;
pub mod storage;

pub use storage::InMemoryStorage;
