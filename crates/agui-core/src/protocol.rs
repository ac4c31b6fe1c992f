//! Wire protocol for the AG-UI channel and its HTTP fallback.
//!
//! Every frame is one JSON object discriminated by a `type` field. Outbound
//! and inbound directions are separate closed enums so that dispatch is
//! checked for exhaustiveness at compile time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::ConversationId;
use crate::intent::Intent;

/// Opaque reference to what a conversation is about (e.g. an artist).
///
/// Only `id` is interpreted; everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Human-facing label: the name when present, the id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

// ============================================================================
// Outbound
// ============================================================================

/// Context attached to every user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageContext {
    pub current_artist: Option<Subject>,
    pub timestamp: DateTime<Utc>,
    pub user_intent: Intent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub conversation_id: ConversationId,
    pub message: String,
    pub context: MessageContext,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationRequest {
    pub visualization_type: String,
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Envelopes sent from the session layer to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEnvelope {
    UserMessage(UserMessage),
    GenerateVisualization(VisualizationRequest),
}

impl OutboundEnvelope {
    /// Fallback endpoint that accepts this envelope as a request body.
    pub fn fallback_path(&self) -> &'static str {
        match self {
            OutboundEnvelope::UserMessage(_) => "/agui/message",
            OutboundEnvelope::GenerateVisualization(_) => "/agui/visualization",
        }
    }

    pub fn conversation_id(&self) -> Option<&ConversationId> {
        match self {
            OutboundEnvelope::UserMessage(m) => Some(&m.conversation_id),
            OutboundEnvelope::GenerateVisualization(_) => None,
        }
    }
}

// ============================================================================
// Inbound
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiResponse {
    pub content: String,
    pub conversation_id: ConversationId,
    #[serde(default, with = "wire_time")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub streaming: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedComponent {
    pub component: String,
    #[serde(default)]
    pub props: serde_json::Value,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextUpdate {
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistInsight {
    pub artist: serde_json::Value,
    pub insight: String,
    pub insight_type: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// Envelopes pushed by the backend (or returned by the fallback).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEnvelope {
    AiResponse(AiResponse),
    GeneratedComponent(GeneratedComponent),
    ContextUpdate(ContextUpdate),
    ArtistInsight(ArtistInsight),
}

impl InboundEnvelope {
    /// Parse a single text frame.
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Timestamps are written as RFC 3339 and read as either RFC 3339 strings or
/// epoch milliseconds.
mod wire_time {
    use chrono::{DateTime, TimeZone, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(DateTime<Utc>),
        Millis(i64),
    }

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<Raw>::deserialize(deserializer)?;
        Ok(match raw {
            Some(Raw::Text(ts)) => Some(ts),
            Some(Raw::Millis(ms)) => Utc.timestamp_millis_opt(ms).single(),
            None => None,
        })
    }
}
