//! Error taxonomy for the session layer.

use thiserror::Error;

use crate::conversation::ConversationId;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A connection attempt is already in progress")]
    AlreadyConnecting,

    #[error("Failed to connect: {0}")]
    Connection(String),

    #[error("No transport available: {0}")]
    NotConnected(String),

    #[error("Conversation not found: {0}")]
    UnknownConversation(ConversationId),

    #[error("No active conversation")]
    NoActiveConversation,

    #[error("Malformed envelope: {0}")]
    Protocol(String),

    #[error("Fallback request rejected with status {status}: {body}")]
    FallbackRejected { status: u16, body: String },
}

/// Failure of a single request on the fallback transport.
#[derive(Error, Debug)]
pub enum FallbackError {
    /// The backend could not be reached at all.
    #[error("{0}")]
    Unreachable(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid response body: {0}")]
    InvalidBody(String),
}

impl From<FallbackError> for SessionError {
    fn from(err: FallbackError) -> Self {
        match err {
            FallbackError::Unreachable(reason) => SessionError::NotConnected(reason),
            FallbackError::Status { status, body } => {
                SessionError::FallbackRejected { status, body }
            }
            FallbackError::InvalidBody(reason) => SessionError::Protocol(reason),
        }
    }
}
