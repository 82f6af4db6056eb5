//! Team orchestrator - drives the hired agents round by round

use tokio::sync::mpsc;
use tracing::{debug, error, info, instrument, warn};

use crate::agent::{Agent, RoundContext};
use crate::config::KoboldConfig;
use crate::environment::EnvironmentHandle;
use crate::message::{ActionTag, Message};
use crate::session::SessionHandle;
use crate::types::RoundId;

/// Progress notifications emitted while a team runs
#[derive(Debug, Clone, PartialEq)]
pub enum TeamEvent {
    RoundStarted {
        round: RoundId,
    },
    MessagePublished {
        round: RoundId,
        agent: String,
        tag: ActionTag,
    },
    /// The agent had nothing new to react to
    AgentIdle {
        round: RoundId,
        agent: String,
    },
    /// The agent failed this round and will retry in the next one
    AgentFailed {
        round: RoundId,
        agent: String,
        error: String,
    },
    /// The agent failed fatally and will not run again
    AgentHalted {
        round: RoundId,
        agent: String,
        error: String,
    },
    RoundFinished {
        round: RoundId,
        published: usize,
    },
}

struct Hired {
    agent: Box<dyn Agent>,
    halted: bool,
}

/// A set of agents sharing one message log and one game session
pub struct Team {
    env: EnvironmentHandle,
    session: SessionHandle,
    agents: Vec<Hired>,
    round: RoundId,
    event_tx: Option<mpsc::UnboundedSender<TeamEvent>>,
}

impl Team {
    /// Create a team with an empty log and no event stream
    pub fn new(session: SessionHandle) -> Self {
        Self {
            env: EnvironmentHandle::default(),
            session,
            agents: Vec::new(),
            round: RoundId::default(),
            event_tx: None,
        }
    }

    /// Create a team and return the receiving end of its event stream
    pub fn with_channel(session: SessionHandle) -> (Self, mpsc::UnboundedReceiver<TeamEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let mut team = Self::new(session);
        team.event_tx = Some(event_tx);
        (team, event_rx)
    }

    /// Add agents; they run in hiring order every round
    pub fn hire(&mut self, agents: impl IntoIterator<Item = Box<dyn Agent>>) {
        for agent in agents {
            info!(agent = %agent.role().setting, "Hired agent");
            self.agents.push(Hired { agent, halted: false });
        }
    }

    /// The shared message log
    pub fn environment(&self) -> &EnvironmentHandle {
        &self.env
    }

    /// The shared game session
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Names of agents that have not been halted
    pub fn active_agents(&self) -> Vec<String> {
        self.agents
            .iter()
            .filter(|h| !h.halted)
            .map(|h| h.agent.role().name().to_string())
            .collect()
    }

    /// Set the task and post it as the player's opening message
    pub fn start(&self, task: impl Into<String>) {
        let task = task.into();
        info!(task = %task, "Starting team");
        self.session.update_task(task.clone());
        self.env
            .publish(Message::new("Player", task, ActionTag::PlayerActions));
    }

    /// Run `n_round` rounds and return the whole message log
    #[instrument(skip(self))]
    pub async fn run(&mut self, n_round: usize) -> Vec<Message> {
        let mut remaining = n_round;
        while remaining > 0 {
            remaining -= 1;
            if self.agents.iter().all(|h| h.halted) {
                warn!("No active agents left, stopping early");
                break;
            }
            self.run_round().await;
        }
        self.env.history()
    }

    /// Run as many rounds as the configuration asks for
    pub async fn run_configured(&mut self, config: &KoboldConfig) -> Vec<Message> {
        self.run(config.rounds as usize).await
    }

    async fn run_round(&mut self) {
        self.round = self.round.next();
        let round = self.round;
        let watermark = self.env.watermark();
        let ctx = RoundContext::for_round(round, watermark, self.session.clone());
        info!(round = %round, watermark, "Round started");
        emit(&self.event_tx, TeamEvent::RoundStarted { round });

        let mut published = 0;
        for hired in self.agents.iter_mut().filter(|h| !h.halted) {
            let agent = hired.agent.role().name().to_string();
            match hired.agent.run(&self.env, &ctx).await {
                Ok(Some(message)) => {
                    published += 1;
                    debug!(agent = %agent, message = %message.preview(), "Published message");
                    emit(
                        &self.event_tx,
                        TeamEvent::MessagePublished {
                            round,
                            agent,
                            tag: message.cause_by,
                        },
                    );
                }
                Ok(None) => emit(&self.event_tx, TeamEvent::AgentIdle { round, agent }),
                Err(e) if e.is_fatal() => {
                    error!(agent = %agent, error = %e, "Halting agent");
                    hired.halted = true;
                    emit(
                        &self.event_tx,
                        TeamEvent::AgentHalted {
                            round,
                            agent,
                            error: e.to_string(),
                        },
                    );
                }
                Err(e) => {
                    warn!(agent = %agent, error = %e, "Agent failed this round");
                    emit(
                        &self.event_tx,
                        TeamEvent::AgentFailed {
                            round,
                            agent,
                            error: e.to_string(),
                        },
                    );
                }
            }
        }

        info!(round = %round, published, "Round finished");
        emit(&self.event_tx, TeamEvent::RoundFinished { round, published });
    }
}

fn emit(event_tx: &Option<mpsc::UnboundedSender<TeamEvent>>, event: TeamEvent) {
    if let Some(tx) = event_tx {
        let _ = tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::action::{Action, Dispatched, PromptAction};
    use crate::agent::{Role, RoleSetting};
    use crate::testing::ScriptedModel;

    fn prompt_role(name: &str, watch: ActionTag, produce: ActionTag, reply: &str) -> Box<dyn Agent> {
        let model = Arc::new(ScriptedModel::new([reply]));
        let mut role = Role::new(RoleSetting::new(name, name, "help", "none"), model.clone());
        role.set_actions(vec![
            Arc::new(PromptAction::new(produce, "Do your part.", model)) as Arc<dyn Action>
        ]);
        role.watch([watch]);
        Box::new(role)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<TeamEvent>) -> Vec<TeamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_start_publishes_player_message() {
        let team = Team::new(SessionHandle::default());
        team.start("Mine 3 cobblestone");

        assert_eq!(team.session().current_task(), "Mine 3 cobblestone");
        let history = team.environment().history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, "Player");
        assert_eq!(history[0].cause_by, ActionTag::PlayerActions);
    }

    #[tokio::test]
    async fn test_messages_become_visible_next_round() {
        let (mut team, mut rx) = Team::with_channel(SessionHandle::default());
        team.hire([
            prompt_role("Alice", ActionTag::PlayerActions, ActionTag::DesignCurriculum, "Mine 1 wood log"),
            prompt_role("Carol", ActionTag::DesignCurriculum, ActionTag::RetrieveSkills, "no skills"),
        ]);
        team.start("play");

        let history = team.run(2).await;
        let tags: Vec<_> = history.iter().map(|m| m.cause_by).collect();
        assert_eq!(
            tags,
            [ActionTag::PlayerActions, ActionTag::DesignCurriculum, ActionTag::RetrieveSkills]
        );

        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                TeamEvent::RoundStarted { round: RoundId(1) },
                TeamEvent::MessagePublished {
                    round: RoundId(1),
                    agent: "Alice".into(),
                    tag: ActionTag::DesignCurriculum,
                },
                TeamEvent::AgentIdle { round: RoundId(1), agent: "Carol".into() },
                TeamEvent::RoundFinished { round: RoundId(1), published: 1 },
                TeamEvent::RoundStarted { round: RoundId(2) },
                TeamEvent::AgentIdle { round: RoundId(2), agent: "Alice".into() },
                TeamEvent::MessagePublished {
                    round: RoundId(2),
                    agent: "Carol".into(),
                    tag: ActionTag::RetrieveSkills,
                },
                TeamEvent::RoundFinished { round: RoundId(2), published: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn test_unroutable_agent_is_halted() {
        let (mut team, mut rx) = Team::with_channel(SessionHandle::default());
        let mut broken = Role::new(
            RoleSetting::new("John", "Skills Management Specialist", "manage skills", "none"),
            Arc::new(ScriptedModel::default()),
        );
        broken.set_actions(vec![Arc::new(Dispatched(ActionTag::GenerateActionCode)) as Arc<dyn Action>]);
        broken.watch([ActionTag::PlayerActions]);
        team.hire([Box::new(broken) as Box<dyn Agent>]);
        team.start("play");

        let history = team.run(3).await;
        assert_eq!(history.len(), 1);
        assert!(team.active_agents().is_empty());

        let events = drain(&mut rx);
        assert!(events.contains(&TeamEvent::AgentHalted {
            round: RoundId(1),
            agent: "John".into(),
            error: "Agent John has no handler for GenerateActionCode".into(),
        }));
        // the loop stops once nobody is left
        assert!(!events.contains(&TeamEvent::RoundStarted { round: RoundId(2) }));
    }

    #[tokio::test]
    async fn test_non_fatal_error_keeps_agent() {
        let (mut team, mut rx) = Team::with_channel(SessionHandle::default());
        // model has no replies, so the prompt action fails with a model error
        let model = Arc::new(ScriptedModel::default());
        let mut role = Role::new(RoleSetting::new("Alice", "Designer", "help", "none"), model.clone());
        role.set_actions(vec![
            Arc::new(PromptAction::new(ActionTag::DesignCurriculum, "Go.", model)) as Arc<dyn Action>
        ]);
        role.watch([ActionTag::PlayerActions]);
        team.hire([Box::new(role) as Box<dyn Agent>]);
        team.start("play");

        team.run(1).await;
        assert_eq!(team.active_agents(), ["Alice"]);
        let events = drain(&mut rx);
        assert_eq!(
            events,
            vec![
                TeamEvent::RoundStarted { round: RoundId(1) },
                TeamEvent::AgentFailed {
                    round: RoundId(1),
                    agent: "Alice".into(),
                    error: "Model error: Model unavailable: no scripted reply left".into(),
                },
                TeamEvent::RoundFinished { round: RoundId(1), published: 0 },
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_agent_acts_again_next_round() {
        let (mut team, mut rx) = Team::with_channel(SessionHandle::default());
        let model = Arc::new(ScriptedModel::new(["1", "Mine 1 wood log"]).with_failures(1));
        let mut role = Role::new(RoleSetting::new("Alice", "Designer", "help", "none"), model.clone());
        role.set_actions(vec![
            Arc::new(Dispatched(ActionTag::RetrieveSkills)) as Arc<dyn Action>,
            Arc::new(PromptAction::new(ActionTag::DesignCurriculum, "Go.", model.clone())),
        ]);
        role.watch([ActionTag::PlayerActions]);
        team.hire([Box::new(role) as Box<dyn Agent>]);
        team.start("play");

        let config = KoboldConfig {
            rounds: 3,
            ..KoboldConfig::default()
        };
        let history = team.run_configured(&config).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].content, "Mine 1 wood log");
        assert_eq!(model.calls(), 3);

        let events = drain(&mut rx);
        assert!(matches!(
            &events[1],
            TeamEvent::AgentFailed { round: RoundId(1), agent, .. } if agent == "Alice"
        ));
        assert!(events.contains(&TeamEvent::MessagePublished {
            round: RoundId(2),
            agent: "Alice".into(),
            tag: ActionTag::DesignCurriculum,
        }));
        assert!(events.contains(&TeamEvent::AgentIdle { round: RoundId(3), agent: "Alice".into() }));
    }
}
