//! Specialised agents that dispatch their actions by tag

pub mod action_developer;
pub mod skill_manager;

pub use action_developer::ActionDeveloper;
pub use skill_manager::SkillManager;

/// Name the action developer is hired under unless configured otherwise
pub const DEFAULT_DEVELOPER_NAME: &str = "Bob";
