//! Skill manager - retrieves, describes and stores skills

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{info, instrument};

use crate::action::{Action, Dispatched};
use crate::agent::{Agent, Role, RoleSetting, RoundContext};
use crate::error::KoboldError;
use crate::llm::LanguageModel;
use crate::message::{ActionTag, Message};
use crate::session::GameSession;
use crate::skills::{NewSkill, SkillCatalogue, SkillLibrary};

use super::DEFAULT_DEVELOPER_NAME;

/// Arguments for one skill handler, pulled from the session
#[derive(Debug, Clone, PartialEq)]
enum SkillRequest {
    Retrieve { query: String, skills: SkillCatalogue },
    Describe { program_name: String, program_code: String },
    Add(NewSkill),
}

/// Agent in charge of the skill catalogue
pub struct SkillManager {
    role: Role,
    library: Arc<dyn SkillLibrary>,
    developer: String,
}

impl SkillManager {
    pub fn new(llm: Arc<dyn LanguageModel>, library: Arc<dyn SkillLibrary>) -> Self {
        let setting = RoleSetting::new(
            "John",
            "Skills Management Specialist",
            "Grow a library of reusable, verified bot programs and surface the ones relevant to the current task",
            "Only programs that ran successfully may be stored",
        );
        Self::with_setting(setting, llm, library)
    }

    pub fn with_setting(
        setting: RoleSetting,
        llm: Arc<dyn LanguageModel>,
        library: Arc<dyn SkillLibrary>,
    ) -> Self {
        let mut role = Role::new(setting, llm);
        role.set_actions(vec![
            Arc::new(Dispatched(ActionTag::RetrieveSkills)) as Arc<dyn Action>,
            Arc::new(Dispatched(ActionTag::GenerateSkillDescription)),
            Arc::new(Dispatched(ActionTag::AddNewSkills)),
        ]);
        role.watch([
            ActionTag::DesignCurriculum,
            ActionTag::GenerateActionCode,
            ActionTag::RetrieveSkills,
            ActionTag::GenerateSkillDescription,
        ]);

        Self {
            role,
            library,
            developer: DEFAULT_DEVELOPER_NAME.to_string(),
        }
    }

    /// Name of the agent retrieval results are addressed to
    pub fn send_retrievals_to(mut self, developer: impl Into<String>) -> Self {
        self.developer = developer.into();
        self
    }

    /// The action to route: a retrieval right after a new curriculum
    /// proposal is served as the curriculum variant.
    fn pending(&self, todo: ActionTag) -> ActionTag {
        let after_curriculum = self
            .role
            .important_memory()
            .last()
            .is_some_and(|m| m.cause_by == ActionTag::DesignCurriculum);
        if todo == ActionTag::RetrieveSkills && after_curriculum {
            ActionTag::DesignCurriculum
        } else {
            todo
        }
    }

    fn request_for(&self, pending: ActionTag, session: &GameSession) -> Result<SkillRequest, KoboldError> {
        match pending {
            ActionTag::DesignCurriculum => Ok(SkillRequest::Retrieve {
                query: session.context(),
                skills: session.skills(),
            }),
            ActionTag::RetrieveSkills => Ok(SkillRequest::Retrieve {
                query: format!("{}\n\n{}", session.context(), session.event_summary()),
                skills: session.skills(),
            }),
            ActionTag::GenerateSkillDescription => Ok(SkillRequest::Describe {
                program_name: session.program_name(),
                program_code: session.program_code(),
            }),
            ActionTag::AddNewSkills => Ok(SkillRequest::Add(NewSkill {
                task: session.current_task(),
                program_name: session.program_name(),
                program_code: session.program_code(),
                description: session.skill_description(),
            })),
            ActionTag::PlayerActions | ActionTag::GenerateActionCode => Err(KoboldError::Unroutable {
                agent: self.role.name().to_string(),
                tag: pending,
            }),
        }
    }

    async fn retrieve_skills(
        &self,
        session: &GameSession,
        query: String,
        skills: SkillCatalogue,
    ) -> Result<Message, KoboldError> {
        info!(query = %query, "Retrieving skills");
        let retrieved = self.library.retrieve(&query, &skills).await?;
        info!(count = retrieved.len(), "Retrieved skills for the action developer");
        session.update_retrieved_skills(retrieved.clone());

        Ok(Message::new(self.role.profile(), format!("{retrieved:?}"), ActionTag::RetrieveSkills)
            .with_payload(json!(retrieved))
            .with_send_to(self.developer.clone()))
    }

    async fn generate_skill_description(
        &self,
        session: &GameSession,
        program_name: String,
        program_code: String,
    ) -> Result<Message, KoboldError> {
        let description = self.library.describe(&program_name, &program_code).await?;
        session.update_skill_description(description.clone());
        Ok(Message::new(self.role.profile(), description, ActionTag::GenerateSkillDescription))
    }

    async fn add_new_skills(&self, session: &GameSession, skill: NewSkill) -> Result<Message, KoboldError> {
        if !session.runtime_status() {
            info!(program = %skill.program_name, "Last run failed, not storing skill");
            return Ok(Message::new(self.role.profile(), "", ActionTag::AddNewSkills));
        }

        let entry = self.library.add_skill(skill).await?;
        session.append_skill(entry.clone());
        Ok(Message::new(self.role.profile(), format!("{entry:?}"), ActionTag::AddNewSkills)
            .with_payload(json!(entry)))
    }
}

#[async_trait]
impl Agent for SkillManager {
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
        let pending = self.pending(todo);
        info!(todo = %todo, pending = %pending, "Dispatching");

        let session = &round.session;
        let message = match self.request_for(pending, session)? {
            SkillRequest::Retrieve { query, skills } => self.retrieve_skills(session, query, skills).await?,
            SkillRequest::Describe {
                program_name,
                program_code,
            } => {
                self.generate_skill_description(session, program_name, program_code)
                    .await?
            }
            SkillRequest::Add(skill) => self.add_new_skills(session, skill).await?,
        };

        let message = message.with_round(round.round);
        self.role.record(message.clone());
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::environment::Environment;
    use crate::session::SessionHandle;
    use crate::skills::SkillEntry;
    use crate::testing::{FakeSkills, ScriptedModel};
    use crate::types::RoundId;

    fn manager(replies: &[&str], library: Arc<FakeSkills>) -> SkillManager {
        SkillManager::new(Arc::new(ScriptedModel::new(replies.iter().copied())), library)
    }

    fn round(session: &SessionHandle) -> RoundContext {
        RoundContext::for_round(RoundId(4), usize::MAX, session.clone())
    }

    #[test]
    fn test_registry_and_subscriptions() {
        let manager = manager(&[], Arc::new(FakeSkills::default()));
        assert_eq!(
            manager.role().states(),
            ["0. RetrieveSkills", "1. GenerateSkillDescription", "2. AddNewSkills"]
        );
        assert!(manager.role().subscriptions().contains(&ActionTag::GenerateActionCode));
        assert!(!manager.role().subscriptions().contains(&ActionTag::AddNewSkills));
    }

    #[tokio::test]
    async fn test_retrieve_after_curriculum_uses_context_only() {
        let library = Arc::new(FakeSkills::default());
        let mut manager = manager(&[], library.clone());
        let session = SessionHandle::default();
        session.update_context("Find a tree");
        session.update_event(vec![crate::bridge::GameEvent::new(
            "onChat",
            json!({"onChat": "I need at least a wooden_pickaxe to mine stone!"}),
        )]);
        manager
            .role_mut()
            .recv(Message::new("Curriculum", "Mine 1 wood log", ActionTag::DesignCurriculum));

        let message = manager.act(&round(&session)).await.unwrap();
        assert_eq!(message.cause_by, ActionTag::RetrieveSkills);
        assert_eq!(message.send_to.as_deref(), Some("Bob"));
        assert_eq!(message.round_id, Some(RoundId(4)));
        assert_eq!(library.queries(), vec!["Find a tree"]);
    }

    #[tokio::test]
    async fn test_retrieve_includes_event_summary() {
        let library = Arc::new(FakeSkills::default());
        let mut manager = manager(&[], library.clone()).send_retrievals_to("Dev");
        let session = SessionHandle::default();
        session.update_context("Find a tree");
        session.update_program_name("mineLog");
        session.append_skill(SkillEntry {
            code: "async function mineLog(bot) {}".into(),
            description: "mines".into(),
        });
        session.update_event(vec![crate::bridge::GameEvent::new(
            "onChat",
            json!({"onChat": "I need at least a wooden_pickaxe to mine stone!"}),
        )]);
        manager
            .role_mut()
            .recv(Message::new("Dev", "code", ActionTag::GenerateActionCode));

        let message = manager.act(&round(&session)).await.unwrap();
        assert_eq!(
            library.queries(),
            vec!["Find a tree\n\nI also need wooden_pickaxe."]
        );
        assert_eq!(message.send_to.as_deref(), Some("Dev"));
        assert_eq!(message.payload, Some(json!(["async function mineLog(bot) {}"])));
        assert_eq!(session.retrieved_skills(), vec!["async function mineLog(bot) {}"]);
    }

    #[tokio::test]
    async fn test_describe_writes_session() {
        let library = Arc::new(FakeSkills::default());
        let mut manager = manager(&["1"], library);
        let session = SessionHandle::default();
        session.update_program_name("craftTable");
        manager
            .role_mut()
            .recv(Message::new("Dev", "code", ActionTag::GenerateActionCode));

        manager.role_mut().think().await.unwrap();
        let message = manager.act(&round(&session)).await.unwrap();
        assert_eq!(message.cause_by, ActionTag::GenerateSkillDescription);
        assert!(session.skill_description().contains("craftTable"));
        assert!(manager.role().memory().contains(&message));
    }

    #[tokio::test]
    async fn test_add_skill_only_after_success() {
        let library = Arc::new(FakeSkills::default());
        let mut manager = manager(&["2", "2"], library.clone());
        let session = SessionHandle::default();
        session.update_program_name("craftTable");
        session.update_program_code("async function craftTable(bot) {}");
        session.update_skill_description("Crafts a table");

        manager.role_mut().think().await.unwrap();
        let skipped = manager.act(&round(&session)).await.unwrap();
        assert_eq!(skipped.content, "");
        assert!(library.added().is_empty());

        session.update_runtime_status(true);
        manager.role_mut().think().await.unwrap();
        let added = manager.act(&round(&session)).await.unwrap();
        assert_eq!(added.cause_by, ActionTag::AddNewSkills);
        assert_eq!(library.added()[0].task, "Mine 1 wood log");
        assert_eq!(session.skills()["craftTable"].description, "Crafts a table");
    }

    #[tokio::test]
    async fn test_collaborator_failure_propagates() {
        let mut manager = manager(&[], Arc::new(FakeSkills::failing()));
        let session = SessionHandle::default();
        let err = manager.act(&round(&session)).await.unwrap_err();
        assert!(matches!(err, KoboldError::Skill(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_unserved_tags_are_unroutable() {
        let manager = manager(&[], Arc::new(FakeSkills::default()));
        let session = GameSession::new();
        for tag in [ActionTag::PlayerActions, ActionTag::GenerateActionCode] {
            let err = manager.request_for(tag, &session).unwrap_err();
            assert!(err.is_fatal());
        }
    }

    #[tokio::test]
    async fn test_run_through_environment() {
        let env = Environment::new();
        let library = Arc::new(FakeSkills::default());
        let mut manager = manager(&["0"], library.clone());
        let session = SessionHandle::default();

        env.publish(Message::new("Curriculum", "Mine 1 wood log", ActionTag::DesignCurriculum));
        let ctx = RoundContext::for_round(RoundId(1), env.watermark(), session);
        let message = manager.run(&env, &ctx).await.unwrap().unwrap();

        assert_eq!(message.cause_by, ActionTag::RetrieveSkills);
        assert_eq!(env.history().last(), Some(&message));
    }
}
