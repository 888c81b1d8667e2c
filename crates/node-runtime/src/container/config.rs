//! # Node Configuration
//!
//! Configuration for one cluster node: identity, event bus and transaction
//! manager.
//!
//! ## Environment Overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TXG_NODE_ID` | `node_id` |
//! | `TXG_REMOTE_TIMEOUT_MS` | `events.remote_timeout_ms` |
//! | `TXG_ENABLED_EVENTS` | `events.enabled_events` (comma-separated) |
//! | `TXG_NOTIFY_OUTCOMES` | `transactions.notify_outcomes` |

use shared_bus::{EventBusConfig, EventType, UnknownEventType};
use shared_types::NodeId;
use thiserror::Error;
use tx_coordinator::TxConfig;

pub const ENV_NODE_ID: &str = "TXG_NODE_ID";
pub const ENV_REMOTE_TIMEOUT_MS: &str = "TXG_REMOTE_TIMEOUT_MS";
pub const ENV_ENABLED_EVENTS: &str = "TXG_ENABLED_EVENTS";
pub const ENV_NOTIFY_OUTCOMES: &str = "TXG_NOTIFY_OUTCOMES";

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    /// Identity of this node in the cluster.
    pub node_id: NodeId,
    /// Event bus configuration.
    pub events: EventBusConfig,
    /// Transaction manager configuration.
    pub transactions: TxConfig,
}

impl NodeConfig {
    /// Default configuration for `node_id`.
    pub fn for_node(node_id: NodeId) -> Self {
        Self {
            node_id,
            ..Self::default()
        }
    }

    /// Copy of this configuration for another node.
    pub fn with_node_id(&self, node_id: NodeId) -> Self {
        Self {
            node_id,
            ..self.clone()
        }
    }

    /// Validate configuration.
    ///
    /// # Returns
    ///
    /// Returns `Err` if:
    /// - the remote timeout is zero
    /// - outcome events are enabled while outcome notification is off
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.events.remote_timeout_ms == 0 {
            return Err(ConfigError::ZeroRemoteTimeout);
        }
        if !self.transactions.notify_outcomes {
            if let Some(ty) = self
                .events
                .enabled_events
                .iter()
                .find(|ty| !ty.is_vetoable())
            {
                return Err(ConfigError::OutcomeEventsSilenced(*ty));
            }
        }
        Ok(())
    }

    /// Defaults overridden from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_NODE_ID) {
            config.node_id = NodeId::new(parse(ENV_NODE_ID, &raw)?);
        }
        if let Some(raw) = lookup(ENV_REMOTE_TIMEOUT_MS) {
            config.events.remote_timeout_ms = parse(ENV_REMOTE_TIMEOUT_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_ENABLED_EVENTS) {
            config.events.enabled_events = parse_event_list(&raw)?;
        }
        if let Some(raw) = lookup(ENV_NOTIFY_OUTCOMES) {
            config.transactions.notify_outcomes = parse(ENV_NOTIFY_OUTCOMES, &raw)?;
        }

        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}

/// Parse `started,committed,rolled_back`. Blank entries are skipped.
pub fn parse_event_list(raw: &str) -> Result<Vec<EventType>, ConfigError> {
    let mut types = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let ty: EventType = name.parse()?;
        if !types.contains(&ty) {
            types.push(ty);
        }
    }
    Ok(types)
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Remote round trips would time out immediately.
    #[error("events.remote_timeout_ms must be greater than zero")]
    ZeroRemoteTimeout,

    /// An outcome event is enabled but the manager never publishes it.
    #[error("event type {0} is enabled but transactions.notify_outcomes is off")]
    OutcomeEventsSilenced(EventType),

    /// An override could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error(transparent)]
    UnknownEvent(#[from] UnknownEventType),
}
