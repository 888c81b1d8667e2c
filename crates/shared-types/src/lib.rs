//! # Shared Types Crate
//!
//! This crate contains the identifiers and error types used by every crate in
//! the workspace.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: Node and transaction identifiers are defined
//!   here so the bus and the coordinator agree on wire representation.
//! - **Serializable Identity**: Everything that crosses a node boundary derives
//!   `Serialize`/`Deserialize`.

pub mod entities;
pub mod errors;

pub use entities::*;
pub use errors::*;
