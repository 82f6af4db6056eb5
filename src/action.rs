//! Actions - the units of work an agent can perform

use std::sync::Arc;

use async_trait::async_trait;

use crate::agent::RoundContext;
use crate::error::KoboldError;
use crate::llm::LanguageModel;
use crate::message::{ActionOutput, ActionTag, Message};

/// Everything an action gets to look at when it runs
pub struct ActionContext<'a> {
    /// Name of the agent running the action
    pub agent: &'a str,
    /// The agent's memory, filtered to the actions it watches
    pub memory: &'a [Message],
    pub round: &'a RoundContext,
}

#[async_trait]
pub trait Action: Send + Sync {
    /// The tag carried by messages this action produces
    fn tag(&self) -> ActionTag;

    async fn run(&self, ctx: &ActionContext<'_>) -> Result<ActionOutput, KoboldError>;
}

/// Registry entry for an action that the owning agent dispatches itself.
///
/// Running it through the generic role path is a wiring mistake and fails as
/// unroutable.
#[derive(Debug, Clone, Copy)]
pub struct Dispatched(pub ActionTag);

#[async_trait]
impl Action for Dispatched {
    fn tag(&self) -> ActionTag {
        self.0
    }

    async fn run(&self, ctx: &ActionContext<'_>) -> Result<ActionOutput, KoboldError> {
        Err(KoboldError::Unroutable {
            agent: ctx.agent.to_string(),
            tag: self.0,
        })
    }
}

/// Action that asks the model with a fixed instruction and the watched history
pub struct PromptAction {
    tag: ActionTag,
    instruction: String,
    llm: Arc<dyn LanguageModel>,
}

impl PromptAction {
    pub fn new(tag: ActionTag, instruction: impl Into<String>, llm: Arc<dyn LanguageModel>) -> Self {
        Self {
            tag,
            instruction: instruction.into(),
            llm,
        }
    }
}

#[async_trait]
impl Action for PromptAction {
    fn tag(&self) -> ActionTag {
        self.tag
    }

    async fn run(&self, ctx: &ActionContext<'_>) -> Result<ActionOutput, KoboldError> {
        let history = ctx
            .memory
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!("{}\n\n## History\n{}\n", self.instruction, history);
        let reply = self.llm.ask(&prompt).await?;
        Ok(ActionOutput::new(reply))
    }
}
