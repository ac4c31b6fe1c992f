//! ChatSession - the public entry point of the session layer.
//!
//! A `ChatSession` owns one connection manager, one conversation registry and
//! one event bus. There is no process-wide state: callers create a session
//! and pass it (or an `Arc` of it) wherever it is needed.
//!
//! ```text
//!   consumer ──► ChatSession ──► ConversationRegistry
//!                    │
//!                    ├──► classify_intent
//!                    │
//!                    └──► ConnectionManager ──► channel / HTTP fallback
//!                                │
//!   consumer ◄── EventBus ◄──────┘ (inbound frames, state changes)
//! ```
//!
//! History contract: outgoing user messages are recorded before they are
//! sent; every `ai_response` for a registered conversation is recorded,
//! whether it arrived over the channel or as a fallback reply.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use crate::config::SessionConfig;
use crate::connection::{
    ConnectionManager, ConnectionState, FallbackTransport, HttpFallback, SendOutcome,
};
use crate::conversation::{
    Conversation, ConversationId, ConversationMessage, ConversationRegistry,
};
use crate::error::SessionError;
use crate::event_bus::{EventBus, SubscriptionId};
use crate::events::{SessionEvent, Topic};
use crate::intent::classify_intent;
use crate::logging::open_transcript;
use crate::protocol::{
    AiResponse, InboundEnvelope, MessageContext, OutboundEnvelope, Subject, UserMessage,
    VisualizationRequest,
};

/// Result of [`ChatSession::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub connected: bool,
    pub backend_healthy: bool,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.connected && self.backend_healthy
    }
}

/// Result of [`ChatSession::start_conversation`].
#[derive(Debug, Clone, PartialEq)]
pub struct StartedConversation {
    pub id: ConversationId,
    /// How the opening message was sent, with the fallback reply if any.
    pub outcome: SendOutcome,
}

/// Builder for a [`ChatSession`].
#[derive(Default)]
pub struct ChatSessionBuilder {
    config: Option<SessionConfig>,
    event_bus: Option<Arc<EventBus>>,
    fallback: Option<Arc<dyn FallbackTransport>>,
}

impl ChatSessionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Use an existing EventBus (e.g. one shared with other components).
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Use a custom fallback transport (for testing or custom HTTP stacks).
    pub fn fallback(mut self, fallback: Arc<dyn FallbackTransport>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn build(self) -> ChatSession {
        let config = self.config.unwrap_or_default();
        let event_bus = self.event_bus.unwrap_or_else(|| Arc::new(EventBus::new()));
        let fallback = self
            .fallback
            .unwrap_or_else(|| Arc::new(HttpFallback::new(&config)));

        let log_id = format!("session-{}", Utc::now().format("%Y%m%dT%H%M%S%3f"));
        let transcript = open_transcript(config.wire_log_dir.as_deref(), &log_id);

        let registry = match config.max_conversations {
            Some(max) => ConversationRegistry::with_capacity(max),
            None => ConversationRegistry::new(),
        };
        let conversations = Arc::new(Mutex::new(registry));

        let recorder = Arc::clone(&conversations);
        let history_subscription = event_bus.subscribe(Topic::Message, move |event| {
            if let SessionEvent::Message(response) = event {
                record_response(&recorder, response);
            }
            Ok(())
        });

        let connection = ConnectionManager::new(
            config.clone(),
            Arc::clone(&event_bus),
            fallback,
            transcript,
        );

        ChatSession {
            config,
            event_bus,
            connection,
            conversations,
            history_subscription,
        }
    }
}

/// Append an assistant response to its conversation if it is registered.
fn record_response(conversations: &Mutex<ConversationRegistry>, response: &AiResponse) {
    let mut registry = conversations.lock().unwrap();
    let message = ConversationMessage::assistant(response.content.clone(), response.streaming);
    if registry.append(&response.conversation_id, message).is_err() {
        log::debug!(
            "Response for unregistered conversation {} not recorded",
            response.conversation_id
        );
    }
}

pub struct ChatSession {
    config: SessionConfig,
    event_bus: Arc<EventBus>,
    connection: ConnectionManager,
    conversations: Arc<Mutex<ConversationRegistry>>,
    history_subscription: SubscriptionId,
}

impl ChatSession {
    /// Session with default transports for `config`.
    pub fn new(config: SessionConfig) -> Self {
        ChatSessionBuilder::new().config(config).build()
    }

    pub fn builder() -> ChatSessionBuilder {
        ChatSessionBuilder::new()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Connect the channel and probe backend health.
    ///
    /// Connection failures are returned; an unhealthy backend is reported in
    /// the readiness value.
    pub async fn initialize(&self) -> Result<Readiness, SessionError> {
        self.connection.connect().await?;
        let backend_healthy = self.connection.probe_health().await;
        let readiness = Readiness {
            connected: self.connection.is_connected(),
            backend_healthy,
        };
        log::info!(
            "Session initialized (connected: {}, backend healthy: {})",
            readiness.connected,
            readiness.backend_healthy
        );
        Ok(readiness)
    }

    /// Reconnect after a disconnect. Retry policy belongs to the caller.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        self.connection.connect().await
    }

    /// Create a conversation about `subject` and send its opening message.
    ///
    /// The conversation stays registered even if the opening message fails.
    /// A fallback reply to the opening message is returned in the outcome.
    pub async fn start_conversation(
        &self,
        subject: Subject,
    ) -> Result<StartedConversation, SessionError> {
        let opening = format!("Tell me about {}", subject.label());
        let id = self.conversations.lock().unwrap().create(subject);
        log::info!("Started conversation {}", id);
        let outcome = self.send_message(&opening, Some(&id)).await?;
        Ok(StartedConversation { id, outcome })
    }

    /// Classify, record and send a user message.
    ///
    /// Without an explicit id the most recently created conversation is used.
    pub async fn send_message(
        &self,
        text: &str,
        conversation_id: Option<&ConversationId>,
    ) -> Result<SendOutcome, SessionError> {
        let intent = classify_intent(text);

        let envelope = {
            let mut registry = self.conversations.lock().unwrap();
            let id = match conversation_id {
                Some(id) => id.clone(),
                None => registry
                    .latest()
                    .cloned()
                    .ok_or(SessionError::NoActiveConversation)?,
            };

            registry.append(&id, ConversationMessage::user(text, intent))?;
            let conversation = registry
                .get_mut(&id)
                .ok_or_else(|| SessionError::UnknownConversation(id.clone()))?;
            conversation.context.user_intent = intent.as_str().to_string();

            OutboundEnvelope::UserMessage(UserMessage {
                conversation_id: id,
                message: text.to_string(),
                context: MessageContext {
                    current_artist: Some(conversation.subject.clone()),
                    timestamp: Utc::now(),
                    user_intent: intent,
                },
            })
        };

        log::debug!("Sending message with intent {}", intent);
        let outcome = self.connection.send(&envelope).await?;

        if let SendOutcome::Fallback(Some(InboundEnvelope::AiResponse(response))) = &outcome {
            record_response(&self.conversations, response);
        }
        Ok(outcome)
    }

    /// Ask the backend for a visualization. Replies, if any, are not awaited
    /// beyond the fallback request itself.
    pub async fn request_visualization(
        &self,
        kind: &str,
        context: serde_json::Value,
    ) -> Result<(), SessionError> {
        let envelope = OutboundEnvelope::GenerateVisualization(VisualizationRequest {
            visualization_type: kind.to_string(),
            context,
        });
        match self.connection.send(&envelope).await? {
            SendOutcome::Streamed => log::debug!("Visualization {} requested", kind),
            SendOutcome::Fallback(reply) => {
                log::debug!(
                    "Visualization {} requested via fallback (reply: {})",
                    kind,
                    reply.is_some()
                );
            }
        }
        Ok(())
    }

    /// Message history; empty when the conversation is unknown or none exists.
    pub fn history(&self, conversation_id: Option<&ConversationId>) -> Vec<ConversationMessage> {
        let registry = self.conversations.lock().unwrap();
        let id = match conversation_id {
            Some(id) => id,
            None => match registry.latest() {
                Some(id) => id,
                None => return Vec::new(),
            },
        };
        registry.history(id).to_vec()
    }

    /// Snapshot of a conversation.
    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<Conversation> {
        self.conversations
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
    }

    pub fn current_conversation(&self) -> Option<ConversationId> {
        self.conversations.lock().unwrap().latest().cloned()
    }

    pub fn conversation_ids(&self) -> Vec<ConversationId> {
        self.conversations.lock().unwrap().ids()
    }

    /// Forget a conversation. Later responses for it are published but not
    /// recorded.
    pub fn close_conversation(&self, conversation_id: &ConversationId) -> Option<Conversation> {
        self.conversations.lock().unwrap().remove(conversation_id)
    }

    /// Tear down the channel. Idempotent.
    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        // The recorder holds the registry; detach it from a possibly shared bus.
        self.event_bus
            .unsubscribe(Topic::Message, self.history_subscription);
    }
}
