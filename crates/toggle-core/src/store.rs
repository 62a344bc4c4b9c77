//! Ordered chat history
//!
//! Append-only except for removal of transient placeholders.

use crate::types::ChatMessage;

/// Ordered chat turns; insertion order is display order
#[derive(Debug, Clone, Default)]
pub struct MessageStore {
    messages: Vec<ChatMessage>,
}

impl MessageStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    #[inline]
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drop every placeholder, returning how many were removed
    pub fn remove_placeholders(&mut self) -> usize {
        let before = self.messages.len();
        self.messages.retain(|m| !m.is_placeholder());
        before - self.messages.len()
    }

    /// Drop placeholders and append the terminal message
    pub fn settle(&mut self, message: ChatMessage) {
        self.remove_placeholders();
        self.messages.push(message);
    }

    /// Whether a placeholder is currently shown
    #[inline]
    #[must_use]
    pub fn has_placeholder(&self) -> bool {
        self.messages.iter().any(ChatMessage::is_placeholder)
    }

    /// Messages in display order
    #[inline]
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Last message
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Number of messages
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the store is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
