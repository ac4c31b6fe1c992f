//! ConversationRegistry - identity and state storage for conversations.

use std::collections::HashMap;

use chrono::{TimeZone, Utc};

use super::state::{Conversation, ConversationId, ConversationMessage};
use crate::error::SessionError;
use crate::protocol::Subject;

/// Stores every live conversation keyed by id.
///
/// Unbounded by default. With a capacity, creating a conversation beyond it
/// evicts the least recently active one.
#[derive(Default)]
pub struct ConversationRegistry {
    conversations: HashMap<ConversationId, Conversation>,
    latest: Option<ConversationId>,
    last_stamp: i64,
    /// Bumped on every create and append; orders conversations by activity.
    activity_seq: u64,
    capacity: Option<usize>,
}

impl ConversationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: Some(capacity.max(1)),
            ..Self::default()
        }
    }

    /// Create a conversation about `subject` and return its id.
    pub fn create(&mut self, subject: Subject) -> ConversationId {
        // Ids embed the creation time; bump it when two creations share a millisecond.
        let now = Utc::now().timestamp_millis();
        let stamp = now.max(self.last_stamp + 1);
        self.last_stamp = stamp;

        let started_at = Utc
            .timestamp_millis_opt(stamp)
            .single()
            .unwrap_or_else(Utc::now);
        let id = ConversationId::new(&subject.id, stamp);

        if let Some(capacity) = self.capacity {
            while self.conversations.len() >= capacity {
                if !self.evict_least_active() {
                    break;
                }
            }
        }

        let mut conversation = Conversation::new(id.clone(), subject, started_at);
        conversation.activity = self.next_activity();
        self.conversations.insert(id.clone(), conversation);
        self.latest = Some(id.clone());
        log::debug!("Created conversation {}", id);
        id
    }

    /// Append a message to a registered conversation.
    pub fn append(
        &mut self,
        id: &ConversationId,
        message: ConversationMessage,
    ) -> Result<(), SessionError> {
        let activity = self.activity_seq + 1;
        let conversation = self
            .conversations
            .get_mut(id)
            .ok_or_else(|| SessionError::UnknownConversation(id.clone()))?;
        conversation.push(message);
        conversation.activity = activity;
        self.activity_seq = activity;
        Ok(())
    }

    /// The most recently created conversation that is still registered.
    pub fn latest(&self) -> Option<&ConversationId> {
        self.latest.as_ref()
    }

    pub fn get(&self, id: &ConversationId) -> Option<&Conversation> {
        self.conversations.get(id)
    }

    pub fn get_mut(&mut self, id: &ConversationId) -> Option<&mut Conversation> {
        self.conversations.get_mut(id)
    }

    /// Message history of a conversation; empty for unknown ids.
    pub fn history(&self, id: &ConversationId) -> &[ConversationMessage] {
        self.conversations
            .get(id)
            .map(|c| c.messages())
            .unwrap_or(&[])
    }

    /// Remove a conversation entirely.
    pub fn remove(&mut self, id: &ConversationId) -> Option<Conversation> {
        let removed = self.conversations.remove(id);
        if removed.is_some() && self.latest.as_ref() == Some(id) {
            self.latest = self.most_recently_created();
        }
        removed
    }

    pub fn contains(&self, id: &ConversationId) -> bool {
        self.conversations.contains_key(id)
    }

    /// All registered ids, oldest first.
    pub fn ids(&self) -> Vec<ConversationId> {
        let mut conversations: Vec<&Conversation> = self.conversations.values().collect();
        conversations.sort_by_key(|c| c.started_at);
        conversations.into_iter().map(|c| c.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    fn next_activity(&mut self) -> u64 {
        self.activity_seq += 1;
        self.activity_seq
    }

    fn most_recently_created(&self) -> Option<ConversationId> {
        self.conversations
            .values()
            .max_by_key(|c| c.started_at)
            .map(|c| c.id.clone())
    }

    fn evict_least_active(&mut self) -> bool {
        let victim = self
            .conversations
            .values()
            .min_by_key(|c| c.activity)
            .map(|c| c.id.clone());

        match victim {
            Some(id) => {
                log::info!("Evicting least recently active conversation {}", id);
                self.remove(&id);
                true
            }
            None => false,
        }
    }
}
