//! # Node Container
//!
//! Builds a node's services from its configuration and wires them to the
//! cluster transport.

pub mod config;
pub mod facade;
pub mod node;

pub use config::{ConfigError, NodeConfig};
pub use facade::{Events, LabeledStart, Transactions};
pub use node::ClusterNode;
