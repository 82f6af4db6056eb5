//! Kobold error types

use thiserror::Error;

use crate::bridge::BridgeError;
use crate::llm::LlmError;
use crate::message::ActionTag;

/// Errors that can occur while running the agent society
#[derive(Debug, Error)]
pub enum KoboldError {
    /// A dispatcher was asked to serve an action it has no handler for
    #[error("Agent {agent} has no handler for {tag}")]
    Unroutable { agent: String, tag: ActionTag },

    /// Agent was asked to decide or act without any registered action
    #[error("Agent {0} has no registered actions")]
    EmptyRegistry(String),

    /// Language model error
    #[error("Model error: {0}")]
    Model(#[from] LlmError),

    /// Game bridge error
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Skill library error
    #[error("Skill library error: {0}")]
    Skill(#[from] anyhow::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KoboldError {
    /// Whether this error reflects a broken contract rather than a runtime condition.
    ///
    /// The orchestrator halts an agent that returns a fatal error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unroutable { .. } | Self::EmptyRegistry(_))
    }
}
