//! Private, append-only message memory of one agent

use std::collections::HashSet;

use crate::message::{ActionTag, Message};

/// Ordered record of every message an agent has seen or produced.
///
/// Nothing is ever evicted, so memory grows for the lifetime of the agent.
#[derive(Debug, Clone, Default)]
pub struct AgentMemory {
    storage: Vec<Message>,
}

impl AgentMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, message: Message) {
        self.storage.push(message);
    }

    pub fn add_batch(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.storage.extend(messages);
    }

    pub fn get(&self) -> &[Message] {
        &self.storage
    }

    /// The `k` most recent messages, oldest first
    pub fn get_last(&self, k: usize) -> &[Message] {
        let start = self.storage.len().saturating_sub(k);
        &self.storage[start..]
    }

    /// Messages whose cause is one of `tags`, in insertion order
    pub fn get_by_actions(&self, tags: &HashSet<ActionTag>) -> Vec<Message> {
        self.storage
            .iter()
            .filter(|m| tags.contains(&m.cause_by))
            .cloned()
            .collect()
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.storage.iter().any(|m| m == message)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }
}
