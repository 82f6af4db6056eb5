//! Messages exchanged over the environment bus

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::RoundId;

/// Identifies the action that produced a message, or that an agent watches for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionTag {
    /// Requirements coming from the player driving the team
    PlayerActions,
    /// Proposal of the next task to attempt
    DesignCurriculum,
    /// Generation of a bot control script
    GenerateActionCode,
    /// Lookup of stored skills relevant to the current context
    RetrieveSkills,
    /// Natural language summary of a program
    GenerateSkillDescription,
    /// Registration of a verified program in the skill catalogue
    AddNewSkills,
}

impl ActionTag {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayerActions => "PlayerActions",
            Self::DesignCurriculum => "DesignCurriculum",
            Self::GenerateActionCode => "GenerateActionCode",
            Self::RetrieveSkills => "RetrieveSkills",
            Self::GenerateSkillDescription => "GenerateSkillDescription",
            Self::AddNewSkills => "AddNewSkills",
        }
    }
}

impl fmt::Display for ActionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable unit of communication between agents.
///
/// Equality and hashing only look at `role`, `content` and `cause_by`, so two
/// separately built messages with the same text compare equal. Agents rely on
/// this to avoid absorbing the same bus message twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    pub cause_by: ActionTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub round_id: Option<RoundId>,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>, cause_by: ActionTag) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            payload: None,
            cause_by,
            send_to: None,
            round_id: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_send_to(mut self, recipient: impl Into<String>) -> Self {
        self.send_to = Some(recipient.into());
        self
    }

    pub fn with_round(mut self, round: RoundId) -> Self {
        self.round_id = Some(round);
        self
    }

    /// Short form used in logs
    pub fn preview(&self) -> String {
        let head: String = self.content.chars().take(20).collect();
        format!("{}: {}...", self.role, head)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.role == other.role && self.content == other.content && self.cause_by == other.cause_by
    }
}

impl Eq for Message {}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.role.hash(state);
        self.content.hash(state);
        self.cause_by.hash(state);
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.role, self.content)
    }
}

/// Result of running an action, before it is wrapped into a [`Message`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionOutput {
    pub content: String,
    pub payload: Option<Value>,
}

impl ActionOutput {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

impl From<String> for ActionOutput {
    fn from(content: String) -> Self {
        Self::new(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_value_equality_ignores_metadata() {
        let a = Message::new("Player", "Mine 1 wood log", ActionTag::PlayerActions);
        let b = Message::new("Player", "Mine 1 wood log", ActionTag::PlayerActions)
            .with_payload(json!({"x": 1}))
            .with_send_to("Bob")
            .with_round(RoundId(3));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(!set.insert(b));
    }

    #[test]
    fn test_value_equality_uses_cause() {
        let a = Message::new("Player", "hi", ActionTag::PlayerActions);
        let b = Message::new("Player", "hi", ActionTag::DesignCurriculum);
        assert_ne!(a, b);
    }

    #[test]
    fn test_preview_truncates() {
        let msg = Message::new("Curriculum", "a".repeat(50), ActionTag::DesignCurriculum);
        assert_eq!(msg.preview(), format!("Curriculum: {}...", "a".repeat(20)));
    }

    #[test]
    fn test_serde_skips_empty_fields() {
        let msg = Message::new("Player", "go", ActionTag::PlayerActions);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"role": "Player", "content": "go", "cause_by": "PlayerActions"})
        );
    }
}
