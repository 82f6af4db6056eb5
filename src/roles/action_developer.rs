//! Action developer - writes bot control scripts and validates them

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::action::{Action, Dispatched};
use crate::agent::{Agent, Role, RoleSetting, RoundContext};
use crate::bridge::GameBridge;
use crate::error::KoboldError;
use crate::llm::LanguageModel;
use crate::message::{ActionTag, Message};
use crate::script::ScriptValidator;
use crate::session::GameSession;

use super::DEFAULT_DEVELOPER_NAME;

/// Agent that turns the current task into a validated bot script
pub struct ActionDeveloper {
    role: Role,
    llm: Arc<dyn LanguageModel>,
    validator: ScriptValidator,
    bridge: Option<Arc<dyn GameBridge>>,
}

impl ActionDeveloper {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        let setting = RoleSetting::new(
            DEFAULT_DEVELOPER_NAME,
            "Action Developer",
            "Write JavaScript programs that make the bot complete its current task",
            "Programs must reuse known skills where possible and expose one async entry point taking the bot",
        );
        Self::with_setting(setting, llm)
    }

    pub fn with_setting(setting: RoleSetting, llm: Arc<dyn LanguageModel>) -> Self {
        let mut role = Role::new(setting, llm.clone());
        role.set_actions(vec![
            Arc::new(Dispatched(ActionTag::GenerateActionCode)) as Arc<dyn Action>
        ]);
        role.watch([ActionTag::DesignCurriculum, ActionTag::RetrieveSkills]);

        Self {
            role,
            llm,
            validator: ScriptValidator::new(),
            bridge: None,
        }
    }

    pub fn with_validator(mut self, validator: ScriptValidator) -> Self {
        self.validator = validator;
        self
    }

    /// Run every validated program in the game right away
    pub fn with_bridge(mut self, bridge: Arc<dyn GameBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    fn code_request(&self, session: &GameSession) -> String {
        let previous = session.program_code();
        let previous = if previous.is_empty() {
            "No code in the first round".to_string()
        } else {
            previous
        };
        let critique = session.critique();
        let skills = session.retrieved_skills();

        let mut prompt = self.role.setting.prefix();
        prompt.push_str("\n\nCode from the last round:\n");
        prompt.push_str(&previous);
        prompt.push_str("\n\nChat log: ");
        prompt.push_str(&session.event_summary());
        prompt.push_str("\n\n");
        prompt.push_str(&session.chest_observation());
        prompt.push_str(&format!("Task: {}\n\n", session.current_task()));
        prompt.push_str(&format!("Context: {}\n\n", session.context()));
        prompt.push_str(&format!(
            "Critique: {}\n\n",
            if critique.is_empty() { "None" } else { critique.as_str() }
        ));
        if !skills.is_empty() {
            prompt.push_str("Skills you can call:\n");
            prompt.push_str(&skills.join("\n\n"));
            prompt.push_str("\n\n");
        }
        prompt.push_str(
            "Respond with Explain, Plan and Code sections. Put the code in a ```javascript block. \
             The main function must be async and take a single argument named `bot`.\n",
        );
        prompt
    }

    async fn generate_action_code(&self, session: &GameSession) -> Result<Message, KoboldError> {
        let reply = self.llm.ask(&self.code_request(session)).await?;

        let program = match self.validator.validate(&reply).await {
            Ok(program) => program,
            Err(failure) => {
                warn!(attempts = failure.attempts, error = %failure.last_error, "Generated code rejected");
                return Ok(
                    Message::new(self.role.profile(), failure.to_string(), ActionTag::GenerateActionCode)
                        .with_payload(json!({ "attempts": failure.attempts })),
                );
            }
        };

        info!(program = %program.program_name, "Generated program");
        session.update_program_code(program.program_code.clone());
        session.update_program_name(program.program_name.clone());
        session.update_code(program.runnable());

        if let Some(bridge) = &self.bridge {
            let events = session.on_event(bridge.as_ref()).await?;
            let success = !events.iter().any(|e| e.kind() == "onError");
            session.update_runtime_status(success);
            info!(success, "Ran program in game");
        }

        Ok(
            Message::new(self.role.profile(), program.program_code.clone(), ActionTag::GenerateActionCode)
                .with_payload(json!(program)),
        )
    }
}

#[async_trait]
impl Agent for ActionDeveloper {
    fn role(&self) -> &Role {
        &self.role
    }

    fn role_mut(&mut self) -> &mut Role {
        &mut self.role
    }

    #[instrument(skip_all, fields(agent = %self.role.setting, round = %round.round))]
    async fn act(&mut self, round: &RoundContext) -> Result<Message, KoboldError> {
        let todo = self
            .role
            .todo()
            .map(|a| a.tag())
            .ok_or_else(|| KoboldError::EmptyRegistry(self.role.name().to_string()))?;

        let message = match todo {
            ActionTag::GenerateActionCode => self.generate_action_code(&round.session).await?,
            ActionTag::PlayerActions
            | ActionTag::DesignCurriculum
            | ActionTag::RetrieveSkills
            | ActionTag::GenerateSkillDescription
            | ActionTag::AddNewSkills => {
                return Err(KoboldError::Unroutable {
                    agent: self.role.name().to_string(),
                    tag: todo,
                })
            }
        };

        let message = message.with_round(round.round);
        self.role.record(message.clone());
        Ok(message)
    }
}
