//! # Transaction Events
//!
//! Defines all event types that flow through the shared bus.
//! Events are immutable snapshots; they cross node boundaries as bincode
//! payloads inside `ClusterMessage::Deliver`.

use serde::{Deserialize, Serialize};
use shared_types::{now_millis, NodeId, Timestamp, TxId};
use std::fmt;
use std::str::FromStr;

/// Event type discriminant used for registration and enablement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    /// A transaction was started. Listeners may veto it.
    TxStarted,
    /// A transaction finished its commit.
    TxCommitted,
    /// A transaction was rolled back (by veto, by the client, or by storage failure).
    TxRolledBack,
}

impl EventType {
    /// All transaction event types.
    pub const ALL_TX: [EventType; 3] = [
        EventType::TxStarted,
        EventType::TxCommitted,
        EventType::TxRolledBack,
    ];

    /// Whether a listener verdict for this type can veto the transaction.
    ///
    /// Only the start event precedes the outcome; the other two report it.
    #[must_use]
    pub fn is_vetoable(self) -> bool {
        matches!(self, EventType::TxStarted)
    }

    /// Short configuration name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::TxStarted => "started",
            EventType::TxCommitted => "committed",
            EventType::TxRolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised event type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown event type: {0}")]
pub struct UnknownEventType(pub String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "started" => Ok(EventType::TxStarted),
            "committed" => Ok(EventType::TxCommitted),
            "rolled_back" => Ok(EventType::TxRolledBack),
            other => Err(UnknownEventType(other.to_string())),
        }
    }
}

/// Immutable snapshot of a transaction lifecycle event.
///
/// There is no handle back into the transaction. A listener that wants the
/// transaction rolled back says so through its `Verdict`; the transaction
/// manager applies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxEvent {
    /// What happened.
    pub event_type: EventType,
    /// The transaction this event is about.
    pub tx_id: TxId,
    /// Label supplied at start, if any.
    pub label: Option<String>,
    /// Node where the transaction was started.
    pub origin: NodeId,
    /// When the event was created.
    pub timestamp: Timestamp,
}

impl TxEvent {
    fn new(event_type: EventType, tx_id: TxId, label: Option<String>, origin: NodeId) -> Self {
        Self {
            event_type,
            tx_id,
            label,
            origin,
            timestamp: now_millis(),
        }
    }

    /// Transaction-start event.
    pub fn started(tx_id: TxId, label: Option<String>, origin: NodeId) -> Self {
        Self::new(EventType::TxStarted, tx_id, label, origin)
    }

    /// Transaction-committed event.
    pub fn committed(tx_id: TxId, label: Option<String>, origin: NodeId) -> Self {
        Self::new(EventType::TxCommitted, tx_id, label, origin)
    }

    /// Transaction-rolled-back event.
    pub fn rolled_back(tx_id: TxId, label: Option<String>, origin: NodeId) -> Self {
        Self::new(EventType::TxRolledBack, tx_id, label, origin)
    }

    /// The label, if the transaction was started with one.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}

/// Filter for listener registrations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EventFilter {
    /// Event types to receive. Empty means all.
    pub types: Vec<EventType>,
}

impl EventFilter {
    /// Create a filter that matches all transaction events.
    #[must_use]
    pub fn all() -> Self {
        Self { types: Vec::new() }
    }

    /// Create a filter for specific event types.
    pub fn types(types: impl IntoIterator<Item = EventType>) -> Self {
        let mut types: Vec<EventType> = types.into_iter().collect();
        types.sort();
        types.dedup();
        Self { types }
    }

    /// Event types this filter covers.
    #[must_use]
    pub fn covered(&self) -> Vec<EventType> {
        if self.types.is_empty() {
            EventType::ALL_TX.to_vec()
        } else {
            self.types.clone()
        }
    }

    /// Check if the filter covers an event type.
    #[must_use]
    pub fn contains(&self, event_type: EventType) -> bool {
        self.types.is_empty() || self.types.contains(&event_type)
    }
}
