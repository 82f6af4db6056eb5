//! Scripted collaborators for unit tests

use std::collections::VecDeque;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::bridge::{BridgeError, GameBridge, GameEvent};
use crate::llm::{LanguageModel, LlmError};
use crate::script::Sleeper;
use crate::skills::{NewSkill, SkillCatalogue, SkillEntry, SkillLibrary};

/// Answers prompts from a queue and remembers every prompt it saw
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
    failures: Mutex<usize>,
}

impl ScriptedModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
            failures: Mutex::new(0),
        }
    }

    /// Fail the first `n` calls before answering from the queue
    pub fn with_failures(self, n: usize) -> Self {
        *self.failures.lock() = n;
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        self.prompts.lock().push(prompt.to_string());
        {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(LlmError::Unavailable("model offline".into()));
            }
        }
        self.replies
            .lock()
            .pop_front()
            .ok_or_else(|| LlmError::Unavailable("no scripted reply left".into()))
    }
}

/// Records requested pauses without waiting
#[derive(Default)]
pub struct RecordingSleeper {
    calls: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn calls(&self) -> Vec<Duration> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.calls.lock().push(duration);
    }
}

/// Bridge returning canned events, or a failing status
pub struct FakeBridge {
    events: Option<Vec<GameEvent>>,
    steps: Mutex<Vec<(String, String)>>,
}

impl FakeBridge {
    pub fn with_events(events: Vec<GameEvent>) -> Self {
        Self {
            events: Some(events),
            steps: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            events: None,
            steps: Mutex::new(Vec::new()),
        }
    }

    pub fn steps(&self) -> Vec<(String, String)> {
        self.steps.lock().clone()
    }
}

#[async_trait]
impl GameBridge for FakeBridge {
    async fn step(&self, code: &str, programs: &str) -> Result<Vec<GameEvent>, BridgeError> {
        self.steps.lock().push((code.to_string(), programs.to_string()));
        self.events.clone().ok_or(BridgeError::Status(500))
    }
}

/// In-memory skill library that returns every stored skill on retrieval
#[derive(Default)]
pub struct FakeSkills {
    queries: Mutex<Vec<String>>,
    added: Mutex<Vec<NewSkill>>,
    fail: bool,
}

impl FakeSkills {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }

    pub fn added(&self) -> Vec<NewSkill> {
        self.added.lock().clone()
    }
}

#[async_trait]
impl SkillLibrary for FakeSkills {
    async fn retrieve(&self, query: &str, skills: &SkillCatalogue) -> anyhow::Result<Vec<String>> {
        if self.fail {
            return Err(anyhow!("vector store offline"));
        }
        self.queries.lock().push(query.to_string());
        Ok(skills.values().map(|s| s.code.clone()).collect())
    }

    async fn describe(&self, program_name: &str, _program_code: &str) -> anyhow::Result<String> {
        Ok(format!("async function {program_name}(bot) {{\n    // does the thing\n}}"))
    }

    async fn add_skill(&self, skill: NewSkill) -> anyhow::Result<SkillEntry> {
        let entry = SkillEntry {
            code: skill.program_code.clone(),
            description: skill.description.clone(),
        };
        self.added.lock().push(skill);
        Ok(entry)
    }
}
