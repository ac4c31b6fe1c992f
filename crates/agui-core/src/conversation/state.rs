//! Per-conversation state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::Intent;
use crate::protocol::Subject;

/// Unique identifier for a conversation: `<subject-id>-<creation-millis>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new(subject_id: &str, created_millis: i64) -> Self {
        Self(format!("{}-{}", subject_id, created_millis))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ConversationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a conversation's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Classified intent (user messages only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    /// The backend marked this response as a streaming chunk.
    #[serde(default)]
    pub streaming: bool,
}

impl ConversationMessage {
    pub fn user(content: impl Into<String>, intent: Intent) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            intent: Some(intent),
            streaming: false,
        }
    }

    pub fn assistant(content: impl Into<String>, streaming: bool) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            intent: None,
            streaming,
        }
    }
}

/// Mutable framing of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationContext {
    pub conversation_type: String,
    pub goal: String,
    pub user_intent: String,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self {
            conversation_type: "deep-dive".to_string(),
            goal: "explore".to_string(),
            user_intent: "deepen-understanding".to_string(),
        }
    }
}

/// A single conversation about one subject.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: ConversationId,
    pub subject: Subject,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub context: ConversationContext,
    messages: Vec<ConversationMessage>,
    /// Registry-assigned activity sequence number; larger is more recent.
    pub(crate) activity: u64,
}

impl Conversation {
    pub fn new(id: ConversationId, subject: Subject, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            subject,
            started_at,
            last_activity: started_at,
            context: ConversationContext::default(),
            messages: Vec::new(),
            activity: 0,
        }
    }

    /// Messages in send/receive order.
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Append a message. History is append-only; there is no removal.
    pub(crate) fn push(&mut self, message: ConversationMessage) {
        self.last_activity = self.last_activity.max(Utc::now());
        self.messages.push(message);
    }
}
