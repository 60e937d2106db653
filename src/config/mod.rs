//! Server configuration.
//!
//! ```rust
//! use wynd_io::config::{BroadcastFailurePolicy, ServerConfig};
//!
//! let config = ServerConfig::default()
//!     .with_max_payload(64 * 1024)
//!     .with_broadcast_failure(BroadcastFailurePolicy::Disconnect);
//! assert_eq!(config.max_payload, 64 * 1024);
//! ```

use serde::Deserialize;

use crate::parser::DEFAULT_MAX_ATTACHMENTS;

/// Largest accepted WebSocket message (1MB).
pub const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;

/// What a broadcast does with a recipient whose transport write failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BroadcastFailurePolicy {
    /// Log the failure and keep the socket.
    #[default]
    Log,
    /// Log the failure and disconnect the socket with a transport error.
    Disconnect,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Largest WebSocket message accepted by [`crate::server::Server::listen`].
    pub max_payload: usize,
    /// Largest attachment count a binary packet may declare.
    pub max_attachments: usize,
    pub broadcast_failure: BroadcastFailurePolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_payload: DEFAULT_MAX_PAYLOAD,
            max_attachments: DEFAULT_MAX_ATTACHMENTS,
            broadcast_failure: BroadcastFailurePolicy::default(),
        }
    }
}

impl ServerConfig {
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    pub fn with_max_attachments(mut self, max_attachments: usize) -> Self {
        self.max_attachments = max_attachments;
        self
    }

    pub fn with_broadcast_failure(mut self, policy: BroadcastFailurePolicy) -> Self {
        self.broadcast_failure = policy;
        self
    }

    /// Parses a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
