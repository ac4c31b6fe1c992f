//! Conversation tracking.
//!
//! Conversations live for as long as the session object that owns the
//! registry, independent of transport connectivity.

mod registry;
mod state;

pub use registry::ConversationRegistry;
pub use state::{Conversation, ConversationContext, ConversationId, ConversationMessage, Role};
