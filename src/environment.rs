//! The environment - shared append-only message bus

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::message::{ActionTag, Message};

/// Totally ordered message log shared by every agent of a team.
///
/// Publishing never deduplicates; agents filter what they absorb on their
/// own side. Messages are never removed or rewritten.
#[derive(Debug, Default)]
pub struct Environment {
    log: RwLock<Vec<Message>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the log
    pub fn publish(&self, message: Message) {
        debug!(
            role = %message.role,
            cause_by = %message.cause_by,
            "Publishing message"
        );
        self.log.write().push(message);
    }

    /// The full ordered log
    pub fn history(&self) -> Vec<Message> {
        self.log.read().clone()
    }

    /// The log up to (excluding) `watermark`
    pub fn history_until(&self, watermark: usize) -> Vec<Message> {
        let log = self.log.read();
        log[..watermark.min(log.len())].to_vec()
    }

    /// Ordered sub-sequence of the log caused by one of `tags`
    pub fn get_by_tags(&self, tags: &HashSet<ActionTag>) -> Vec<Message> {
        self.log
            .read()
            .iter()
            .filter(|m| tags.contains(&m.cause_by))
            .cloned()
            .collect()
    }

    /// Current log length; everything below it is visible to observers
    pub fn watermark(&self) -> usize {
        self.log.read().len()
    }

    pub fn len(&self) -> usize {
        self.watermark()
    }

    pub fn is_empty(&self) -> bool {
        self.log.read().is_empty()
    }
}

/// Handle to an environment shared between the team and its observers
#[derive(Clone, Default)]
pub struct EnvironmentHandle {
    inner: Arc<Environment>,
}

impl EnvironmentHandle {
    pub fn new(env: Environment) -> Self {
        Self {
            inner: Arc::new(env),
        }
    }
}

impl std::ops::Deref for EnvironmentHandle {
    type Target = Environment;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_keeps_duplicates_in_order() {
        let env = Environment::new();
        env.publish(Message::new("Player", "a", ActionTag::PlayerActions));
        env.publish(Message::new("Player", "a", ActionTag::PlayerActions));
        env.publish(Message::new("Player", "b", ActionTag::PlayerActions));

        let contents: Vec<_> = env.history().into_iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_get_by_tags() {
        let env = Environment::new();
        env.publish(Message::new("Player", "task", ActionTag::PlayerActions));
        env.publish(Message::new("Dev", "code", ActionTag::GenerateActionCode));
        env.publish(Message::new("Player", "more", ActionTag::PlayerActions));

        let tags = HashSet::from([ActionTag::PlayerActions]);
        let found: Vec<_> = env.get_by_tags(&tags).into_iter().map(|m| m.content).collect();
        assert_eq!(found, vec!["task", "more"]);
        assert!(env.get_by_tags(&HashSet::new()).is_empty());
    }

    #[test]
    fn test_history_until_watermark() {
        let env = Environment::new();
        env.publish(Message::new("Player", "a", ActionTag::PlayerActions));
        let mark = env.watermark();
        env.publish(Message::new("Player", "b", ActionTag::PlayerActions));

        assert_eq!(env.history_until(mark).len(), 1);
        assert_eq!(env.history_until(100).len(), 2);
        assert_eq!(env.len(), 2);
    }

    #[test]
    fn test_handle_shares_log() {
        let handle = EnvironmentHandle::default();
        let other = handle.clone();
        handle.publish(Message::new("Player", "a", ActionTag::PlayerActions));
        assert_eq!(other.len(), 1);
    }
}
