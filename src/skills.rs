//! Skill library seam

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A verified program kept for reuse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillEntry {
    pub code: String,
    pub description: String,
}

/// Skill catalogue keyed by program name
pub type SkillCatalogue = BTreeMap<String, SkillEntry>;

/// Everything needed to register a new skill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSkill {
    pub task: String,
    pub program_name: String,
    pub program_code: String,
    pub description: String,
}

/// Storage and similarity lookup of skills. Implementations are opaque to the core.
#[async_trait]
pub trait SkillLibrary: Send + Sync {
    /// Code of the skills most relevant to `query`, best first
    async fn retrieve(&self, query: &str, skills: &SkillCatalogue) -> anyhow::Result<Vec<String>>;

    /// Natural language description of a program
    async fn describe(&self, program_name: &str, program_code: &str) -> anyhow::Result<String>;

    /// Store a skill and return the entry to record in the catalogue
    async fn add_skill(&self, skill: NewSkill) -> anyhow::Result<SkillEntry>;
}
