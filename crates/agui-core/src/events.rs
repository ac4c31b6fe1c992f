//! Topics and payloads published on the [`EventBus`](crate::event_bus::EventBus).

use serde::{Deserialize, Serialize};

use crate::connection::ConnectionState;
use crate::protocol::{AiResponse, ArtistInsight, ContextUpdate, GeneratedComponent, InboundEnvelope};

/// Named channel on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Connection,
    Message,
    Component,
    Context,
    Insight,
    Error,
}

impl Topic {
    pub const ALL: [Topic; 6] = [
        Topic::Connection,
        Topic::Message,
        Topic::Component,
        Topic::Context,
        Topic::Insight,
        Topic::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::Connection => "connection",
            Topic::Message => "message",
            Topic::Component => "component",
            Topic::Context => "context",
            Topic::Insight => "insight",
            Topic::Error => "error",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame that could not be turned into an [`InboundEnvelope`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolError {
    pub message: String,
    pub frame: String,
}

/// Everything the session layer publishes. The variant determines the topic.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "topic", content = "payload", rename_all = "lowercase")]
pub enum SessionEvent {
    Connection { status: ConnectionState },
    Message(AiResponse),
    Component(GeneratedComponent),
    Context(ContextUpdate),
    Insight(ArtistInsight),
    Error(ProtocolError),
}

impl SessionEvent {
    pub fn topic(&self) -> Topic {
        match self {
            SessionEvent::Connection { .. } => Topic::Connection,
            SessionEvent::Message(_) => Topic::Message,
            SessionEvent::Component(_) => Topic::Component,
            SessionEvent::Context(_) => Topic::Context,
            SessionEvent::Insight(_) => Topic::Insight,
            SessionEvent::Error(_) => Topic::Error,
        }
    }
}

impl From<InboundEnvelope> for SessionEvent {
    fn from(envelope: InboundEnvelope) -> Self {
        match envelope {
            InboundEnvelope::AiResponse(r) => SessionEvent::Message(r),
            InboundEnvelope::GeneratedComponent(c) => SessionEvent::Component(c),
            InboundEnvelope::ContextUpdate(u) => SessionEvent::Context(u),
            InboundEnvelope::ArtistInsight(i) => SessionEvent::Insight(i),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inbound_variants_map_to_topics() {
        let cases = [
            (
                r#"{"type":"ai_response","content":"x","conversationId":"c"}"#,
                Topic::Message,
            ),
            (
                r#"{"type":"generated_component","component":"Chart"}"#,
                Topic::Component,
            ),
            (r#"{"type":"context_update","context":{}}"#, Topic::Context),
            (
                r#"{"type":"artist_insight","artist":"a","insight":"i","insightType":"t"}"#,
                Topic::Insight,
            ),
        ];
        for (frame, topic) in cases {
            let event = SessionEvent::from(InboundEnvelope::parse(frame).unwrap());
            assert_eq!(event.topic(), topic, "{frame}");
        }
    }

    #[test]
    fn connection_event_serializes_status() {
        let event = SessionEvent::Connection {
            status: ConnectionState::Connected,
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"topic": "connection", "payload": {"status": "connected"}}));
    }

    #[test]
    fn topic_names() {
        let names: Vec<&str> = Topic::ALL.iter().map(|t| t.as_str()).collect();
        assert_eq!(
            names,
            vec!["connection", "message", "component", "context", "insight", "error"]
        );
        assert_eq!(
            serde_json::to_string(&Topic::Insight).unwrap(),
            "\"insight\""
        );
    }
}
