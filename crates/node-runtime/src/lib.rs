//! # Node Runtime Library
//!
//! Assembles cluster nodes: event bus, transaction manager and storage per
//! node, joined through an in-process transport. The `main.rs` binary runs a
//! small cluster on top of it.
//!
//! ## Architectural Patterns
//!
//! - **Hexagonal Architecture**: the bus and manager depend on ports; this
//!   crate supplies the adapters
//! - **Decisions, not callbacks**: listeners return verdicts, the manager
//!   applies them

#![allow(clippy::module_name_repetitions)]

pub mod adapters;
pub mod container;

pub use adapters::InMemoryCluster;
pub use container::{ClusterNode, ConfigError, Events, NodeConfig, Transactions};
