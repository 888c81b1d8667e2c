//! # Adapters
//!
//! Port implementations that connect nodes to each other.

pub mod cluster;

pub use cluster::InMemoryCluster;
