//! # Kobold
//!
//! A small society of agents that writes control scripts for a game bot.
//!
//! Agents talk only through a shared, append-only message log. Each round
//! every agent looks at what it subscribes to, picks one of its actions and
//! publishes the result for the others to see in the next round.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          TEAM (rounds)                           │
//! │   watermark ──► run agents one by one ──► TeamEvent stream       │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//!                 ┌───────────────┴───────────────┐
//!                 ▼                               ▼
//!        ┌─────────────────┐             ┌─────────────────┐
//!        │   Environment   │             │   GameSession   │
//!        │ (message log)   │             │ (task, code,    │
//!        └────────┬────────┘             │  skills, chests)│
//!                 │                      └────────┬────────┘
//!     ┌───────────┼───────────┐                   │
//!     ▼           ▼           ▼                   │
//!  ┌──────┐  ┌──────────┐ ┌───────────┐           │
//!  │ Role │  │  Skill   │ │  Action   │◄──────────┘
//!  │      │  │ Manager  │ │ Developer │──► ScriptValidator ──► GameBridge
//!  └──────┘  └──────────┘ └───────────┘
//! ```
//!
//! ## Key Concepts
//!
//! - **Message**: an immutable record tagged with the action that produced it
//! - **Role**: observe, think, act state machine over a registry of actions
//! - **Dispatcher**: an agent that routes its current action by tag
//! - **Session**: game state shared by every agent of a team
//! - **Validator**: turns a model reply into a runnable bot program

pub mod action;
pub mod agent;
pub mod bridge;
pub mod config;
pub mod environment;
pub mod error;
pub mod llm;
pub mod memory;
pub mod message;
pub mod orchestrator;
pub mod roles;
pub mod script;
pub mod session;
pub mod skills;
pub mod types;

#[cfg(test)]
mod testing;

pub use action::{Action, ActionContext, Dispatched, PromptAction};
pub use agent::{Agent, Role, RoleSetting, RoundContext};
pub use bridge::{BridgeError, GameBridge, GameEvent, HttpBridge};
pub use config::{BridgeConfig, KoboldConfig, ModelConfig, ValidatorConfig};
pub use environment::{Environment, EnvironmentHandle};
pub use error::KoboldError;
pub use llm::{LanguageModel, LlmError, OllamaModel};
pub use memory::AgentMemory;
pub use message::{ActionOutput, ActionTag, Message};
pub use orchestrator::{Team, TeamEvent};
pub use roles::{ActionDeveloper, SkillManager};
pub use script::{ScriptError, ScriptValidator, ValidatedProgram, ValidationFailure};
pub use session::{GameSession, SessionHandle};
pub use skills::{NewSkill, SkillCatalogue, SkillEntry, SkillLibrary};
pub use types::{AgentId, RoundId};
