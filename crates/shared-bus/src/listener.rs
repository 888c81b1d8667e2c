//! # Event Listener
//!
//! Defines the listening side of the event bus.
//!
//! A listener is a predicate over `TxEvent` that answers with a `Verdict`:
//! a decision (allow or veto) plus whether it wants to keep listening.

use crate::events::TxEvent;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Registration handle returned by `local_listen` / `remote_listen`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(pub Uuid);

impl ListenerId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a registration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ListenerScope {
    /// Only events raised on the registering node.
    Local,
    /// Events raised on every target node, mirrored cluster-wide.
    Remote,
}

/// Whether the transaction may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    /// No objection.
    Allow,
    /// The transaction must not commit.
    Veto(String),
}

/// A listener's answer to one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Allow or veto.
    pub decision: Decision,
    /// `false` de-registers the listener after this invocation.
    pub retain: bool,
}

impl Verdict {
    /// Allow and keep listening.
    #[must_use]
    pub fn allow() -> Self {
        Self {
            decision: Decision::Allow,
            retain: true,
        }
    }

    /// Veto and keep listening.
    pub fn veto(reason: impl Into<String>) -> Self {
        Self {
            decision: Decision::Veto(reason.into()),
            retain: true,
        }
    }

    /// Stop listening after this invocation.
    #[must_use]
    pub fn and_stop(mut self) -> Self {
        self.retain = false;
        self
    }

    /// Whether this verdict vetoes.
    #[must_use]
    pub fn is_veto(&self) -> bool {
        matches!(self.decision, Decision::Veto(_))
    }
}

/// A listener failed to produce a verdict.
///
/// This is an infrastructure failure, not a veto.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Listener failed: {0}")]
pub struct ListenerError(pub String);

impl ListenerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Trait for transaction event listeners.
///
/// Invoked synchronously on the dispatching task; implementations must not
/// block on the bus they are registered with.
pub trait EventListener: Send + Sync + 'static {
    /// Handle one event.
    fn on_event(&self, event: &TxEvent) -> Result<Verdict, ListenerError>;
}

impl<F> EventListener for F
where
    F: Fn(&TxEvent) -> Result<Verdict, ListenerError> + Send + Sync + 'static,
{
    fn on_event(&self, event: &TxEvent) -> Result<Verdict, ListenerError> {
        self(event)
    }
}
