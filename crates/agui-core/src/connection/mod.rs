//! Transport supervision.
//!
//! One [`ConnectionManager`] owns at most one WebSocket channel to the
//! backend and falls back to plain HTTP requests while that channel is down.
//! Reconnection is never automatic; callers decide when to `connect` again.

mod dispatch;
mod fallback;
mod manager;

use serde::{Deserialize, Serialize};

pub use dispatch::dispatch_frame;
pub use fallback::{FallbackTransport, HttpFallback};
pub use manager::{ConnectionManager, SendOutcome};

/// Lifecycle of the streaming channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
