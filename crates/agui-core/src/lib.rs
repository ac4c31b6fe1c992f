//! # agui-core
//!
//! Real-time conversational session layer for AG-UI backends.
//!
//! This crate is framework-agnostic and can be used by:
//! - The `agui-cli` terminal client
//! - Any UI that wants to talk to an AG-UI backend over WebSocket
//!
//! ## Key Concepts
//!
//! - **ChatSession**: Facade owning one connection, one registry and one bus
//! - **Conversation**: Ordered message history about a single subject
//! - **Topic**: Named event-bus channel (`connection`, `message`, ...)
//! - **Fallback**: Plain HTTP requests used while the channel is down

pub mod config;
pub mod connection;
pub mod conversation;
pub mod error;
pub mod event_bus;
pub mod events;
pub mod intent;
pub mod logging;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use config::{SessionConfig, SessionConfigBuilder};
pub use connection::{ConnectionState, SendOutcome};
pub use conversation::{Conversation, ConversationId, ConversationMessage, Role};
pub use error::SessionError;
pub use event_bus::{EventBus, SubscriptionId};
pub use events::{SessionEvent, Topic};
pub use intent::{classify_intent, Intent};
pub use protocol::{InboundEnvelope, OutboundEnvelope, Subject};
pub use session::{ChatSession, ChatSessionBuilder, Readiness, StartedConversation};
