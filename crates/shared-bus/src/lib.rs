//! # Shared Bus - Transaction Event Bus
//!
//! Delivers transaction lifecycle events to registered listeners, locally and
//! across the cluster.
//!
//! ## Dispatch
//!
//! ```text
//! ┌──────────────┐   dispatch()    ┌──────────────┐   Deliver    ┌──────────────┐
//! │ Transaction  │ ──────────────→ │  Event Bus   │ ───────────→ │ Owner node   │
//! │ Manager      │                 │  (node R)    │              │ (node L)     │
//! │              │ ←── outcome ─── │ local→remote │ ←─ Verdict ─ │ predicate    │
//! └──────────────┘                 └──────────────┘              └──────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - **Synchronous:** `dispatch` returns only after every local listener and
//!   every remote owner has answered.
//! - **Fail-closed:** a remote leg that times out or cannot be reached is an
//!   error, never a silent allow.
//! - **Decisions, not callbacks:** listeners return a `Verdict`; the caller
//!   applies it.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod events;
pub mod listener;
pub mod publisher;
pub mod registry;
pub mod remote;

// Re-export main types
pub use events::{EventFilter, EventType, TxEvent, UnknownEventType};
pub use listener::{Decision, EventListener, ListenerError, ListenerId, ListenerScope, Verdict};
pub use publisher::{BusError, DispatchOutcome, EventBus, EventBusConfig, Veto};
pub use registry::ListenerRegistry;
pub use remote::{
    ClusterMembership, ClusterMessage, ClusterReply, ClusterTransport, RemoteSubscriptions,
    Standalone, TransportError,
};

/// Current protocol version for cluster bus messages.
pub const PROTOCOL_VERSION: u16 = 1;

/// Default bound on a remote round trip, in milliseconds.
pub const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 5_000;
