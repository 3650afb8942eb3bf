//! Per-forum message store.
//!
//! Single source of truth for the current forum's message list. REST
//! history and live socket frames both land here in a unified format.

use classconnect_shared::ChatMessage;

/// Messages for a single forum.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ForumMessages {
    /// All messages, sorted by creation time (ties broken by id) ascending.
    messages: Vec<ChatMessage>,
    /// Whether history has been fetched from the REST API.
    is_loaded: bool,
}

impl ForumMessages {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// Add a message, maintaining sort order. Returns false if a message
    /// with the same id already exists (deduplication).
    pub fn add_message(&mut self, msg: ChatMessage) -> bool {
        if self.messages.iter().any(|m| m.id == msg.id) {
            return false;
        }

        let pos = self
            .messages
            .binary_search_by(|m| (m.created_at, m.id).cmp(&(msg.created_at, msg.id)))
            .unwrap_or_else(|pos| pos);

        self.messages.insert(pos, msg);
        true
    }

    /// Replace the full message history (from the REST fetch) and mark the
    /// forum as loaded.
    pub fn set_history(&mut self, mut messages: Vec<ChatMessage>) {
        messages.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));
        self.messages = messages;
        self.is_loaded = true;
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.is_loaded = false;
    }

    /// Merge a seen receipt into the matching message. `seen_by` only grows;
    /// receipts for unknown messages are ignored.
    pub fn merge_seen(&mut self, message_id: i64, user_id: &str) -> bool {
        match self.messages.iter_mut().find(|m| m.id == message_id) {
            Some(msg) => msg.seen_by.insert(user_id.to_string()),
            None => false,
        }
    }

    /// Fold the server's authoritative copy of one of our own messages into
    /// the list: the oldest optimistic entry with the same content and file
    /// reference is dropped before the server copy is added.
    pub fn reconcile_own(&mut self, msg: ChatMessage) -> bool {
        if let Some(pos) = self.messages.iter().position(|m| {
            m.is_optimistic() && m.content == msg.content && m.file_id == msg.file_id
        }) {
            self.messages.remove(pos);
        }
        self.add_message(msg)
    }
}
