//! Shared game session state
//!
//! Agents never share mutable globals. Every handler receives a
//! [`SessionHandle`] through its round context and goes through the accessor
//! methods below to read or update the session.

use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument};

use crate::bridge::{BridgeError, GameBridge, GameEvent};
use crate::skills::{SkillCatalogue, SkillEntry};

const DEFAULT_TASK: &str = "Mine 1 wood log";
const DEFAULT_CONTEXT: &str =
    "You can mine one of oak, birch, spruce, jungle, acacia, dark oak, or mangrove logs.";

/// What is known about a chest seen by the bot
#[derive(Debug, Clone, PartialEq)]
pub enum ChestState {
    /// Item name to count
    Known(Map<String, Value>),
    /// Seen but never opened
    Unknown,
}

#[derive(Debug, Clone)]
struct SessionState {
    current_task: String,
    context: String,
    code: String,
    program_code: String,
    program_name: String,
    critique: String,
    runtime_status: bool,
    skills: SkillCatalogue,
    retrieved_skills: Vec<String>,
    skill_description: String,
    primitives: Vec<String>,
    events: Vec<GameEvent>,
    event_summary: String,
    chest_memory: BTreeMap<String, ChestState>,
    completed_tasks: Vec<String>,
    failed_tasks: Vec<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            current_task: DEFAULT_TASK.into(),
            context: DEFAULT_CONTEXT.into(),
            code: String::new(),
            program_code: String::new(),
            program_name: String::new(),
            critique: String::new(),
            runtime_status: false,
            skills: SkillCatalogue::new(),
            retrieved_skills: Vec::new(),
            skill_description: String::new(),
            primitives: Vec::new(),
            events: Vec::new(),
            event_summary: String::new(),
            chest_memory: BTreeMap::new(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
        }
    }
}

/// State shared by every agent of a game session
#[derive(Debug, Default)]
pub struct GameSession {
    state: RwLock<SessionState>,
}

impl GameSession {
    /// Create a session with the starting task
    pub fn new() -> Self {
        Self::default()
    }

    /// Task the team is working on
    pub fn current_task(&self) -> String {
        self.state.read().current_task.clone()
    }

    /// Replace the current task
    pub fn update_task(&self, task: impl Into<String>) {
        self.state.write().current_task = task.into();
    }

    /// Hints that accompany the current task
    pub fn context(&self) -> String {
        self.state.read().context.clone()
    }

    /// Replace the task hints
    pub fn update_context(&self, context: impl Into<String>) {
        self.state.write().context = context.into();
    }

    /// Code sent to the bot on the next step: program code plus entry call
    pub fn code(&self) -> String {
        self.state.read().code.clone()
    }

    /// Replace the code for the next step
    pub fn update_code(&self, code: impl Into<String>) {
        self.state.write().code = code.into();
    }

    /// Declarations of the last validated program
    pub fn program_code(&self) -> String {
        self.state.read().program_code.clone()
    }

    /// Store the declarations of a validated program
    pub fn update_program_code(&self, program_code: impl Into<String>) {
        self.state.write().program_code = program_code.into();
    }

    /// Entry function of the last validated program
    pub fn program_name(&self) -> String {
        self.state.read().program_name.clone()
    }

    /// Store the entry function name
    pub fn update_program_name(&self, program_name: impl Into<String>) {
        self.state.write().program_name = program_name.into();
    }

    /// Reviewer feedback on the last attempt
    pub fn critique(&self) -> String {
        self.state.read().critique.clone()
    }

    /// Replace the reviewer feedback
    pub fn update_critique(&self, critique: impl Into<String>) {
        self.state.write().critique = critique.into();
    }

    /// Whether the last program ran successfully in the game
    pub fn runtime_status(&self) -> bool {
        self.state.read().runtime_status
    }

    /// Record whether the last run succeeded
    pub fn update_runtime_status(&self, success: bool) {
        self.state.write().runtime_status = success;
    }

    /// Snapshot of the skill catalogue
    pub fn skills(&self) -> SkillCatalogue {
        self.state.read().skills.clone()
    }

    /// Record a skill under the current program name
    pub fn append_skill(&self, skill: SkillEntry) {
        let mut state = self.state.write();
        let name = state.program_name.clone();
        info!(program = %name, "Adding skill to catalogue");
        state.skills.insert(name, skill);
    }

    /// Skill code picked for the current task
    pub fn retrieved_skills(&self) -> Vec<String> {
        self.state.read().retrieved_skills.clone()
    }

    /// Replace the skills picked for the current task
    pub fn update_retrieved_skills(&self, skills: Vec<String>) {
        self.state.write().retrieved_skills = skills;
    }

    /// Description generated for the last program
    pub fn skill_description(&self) -> String {
        self.state.read().skill_description.clone()
    }

    /// Store the description of the last program
    pub fn update_skill_description(&self, description: impl Into<String>) {
        self.state.write().skill_description = description.into();
    }

    /// Register the control primitives always loaded alongside skills
    pub fn set_primitives(&self, primitives: Vec<String>) {
        self.state.write().primitives = primitives;
    }

    /// Every skill's code followed by every primitive, each ending with a blank line
    pub fn programs(&self) -> String {
        let state = self.state.read();
        let mut programs = String::new();
        for entry in state.skills.values() {
            programs.push_str(&entry.code);
            programs.push_str("\n\n");
        }
        for primitive in &state.primitives {
            programs.push_str(primitive);
            programs.push_str("\n\n");
        }
        programs
    }

    /// Events from the last game step
    pub fn events(&self) -> Vec<GameEvent> {
        self.state.read().events.clone()
    }

    /// Missing-item summary of the last chat log
    pub fn event_summary(&self) -> String {
        self.state.read().event_summary.clone()
    }

    /// Absorb a new event list; an identical list is ignored
    pub fn update_event(&self, events: Vec<GameEvent>) {
        let mut state = self.state.write();
        if state.events == events {
            return;
        }
        update_chest_memory(&mut state.chest_memory, &events);
        state.event_summary = summarize_chatlog(&events);
        state.events = events;
    }

    /// Known chests keyed by position
    pub fn chest_memory(&self) -> BTreeMap<String, ChestState> {
        self.state.read().chest_memory.clone()
    }

    /// Chests for prompts: filled ones first, then empty ones, then unopened ones
    pub fn chest_observation(&self) -> String {
        let state = self.state.read();
        let mut lines = Vec::with_capacity(state.chest_memory.len());
        for (position, chest) in &state.chest_memory {
            if let ChestState::Known(items) = chest {
                if !items.is_empty() {
                    lines.push(format!("{position}: {}", Value::Object(items.clone())));
                }
            }
        }
        for (position, chest) in &state.chest_memory {
            if matches!(chest, ChestState::Known(items) if items.is_empty()) {
                lines.push(format!("{position}: Empty"));
            }
        }
        for (position, chest) in &state.chest_memory {
            if matches!(chest, ChestState::Unknown) {
                lines.push(format!("{position}: Unknown items inside"));
            }
        }

        if lines.is_empty() {
            "Chests: None\n\n".to_string()
        } else {
            format!("Chests:\n{}\n\n", lines.join("\n"))
        }
    }

    /// Tasks finished so far
    pub fn completed_tasks(&self) -> Vec<String> {
        self.state.read().completed_tasks.clone()
    }

    /// Tasks given up on so far
    pub fn failed_tasks(&self) -> Vec<String> {
        self.state.read().failed_tasks.clone()
    }

    /// File the current task as completed or failed
    pub fn record_task_outcome(&self, success: bool) {
        let mut state = self.state.write();
        let task = state.current_task.clone();
        if success {
            state.completed_tasks.push(task);
        } else {
            state.failed_tasks.push(task);
        }
    }

    /// Number of completed tasks
    pub fn progress(&self) -> usize {
        self.state.read().completed_tasks.len()
    }

    /// Run the current code in the game and absorb the resulting events
    #[instrument(skip_all)]
    pub async fn on_event(&self, bridge: &dyn GameBridge) -> Result<Vec<GameEvent>, BridgeError> {
        let code = self.code();
        let programs = self.programs();
        let events = bridge.step(&code, &programs).await?;
        debug!(count = events.len(), "Current events");
        self.update_event(events.clone());
        Ok(events)
    }
}

fn update_chest_memory(memory: &mut BTreeMap<String, ChestState>, events: &[GameEvent]) {
    let Some(nearby) = events
        .last()
        .and_then(|e| e.data().get("nearbyChests"))
        .and_then(Value::as_object)
    else {
        return;
    };

    for (position, chest) in nearby {
        let invalid = chest.as_str() == Some("Invalid");
        if memory.contains_key(position) {
            if let Value::Object(items) = chest {
                memory.insert(position.clone(), ChestState::Known(items.clone()));
            } else if invalid {
                info!(position = %position, "Removing chest");
                memory.remove(position);
            }
        } else if !invalid {
            info!(position = %position, "Saving chest");
            let state = match chest {
                Value::Object(items) => ChestState::Known(items.clone()),
                _ => ChestState::Unknown,
            };
            memory.insert(position.clone(), state);
        }
    }
}

fn chat_patterns() -> &'static [(Regex, Option<&'static str>); 3] {
    static PATTERNS: OnceLock<[(Regex, Option<&'static str>); 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            (
                Regex::new(r"^I cannot make \w+ because I need: (.*)").expect("craft pattern is valid"),
                None,
            ),
            (
                Regex::new(r"^I cannot make \w+ because there is no crafting table nearby")
                    .expect("table pattern is valid"),
                Some("a nearby crafting table"),
            ),
            (
                Regex::new(r"^I need at least a (.*) to mine \w+!").expect("mine pattern is valid"),
                None,
            ),
        ]
    })
}

fn needed_item(message: &str) -> Option<String> {
    chat_patterns().iter().find_map(|(pattern, fixed)| {
        let caps = pattern.captures(message)?;
        match fixed {
            Some(item) => Some((*item).to_string()),
            None => caps.get(1).map(|m| m.as_str().to_string()),
        }
    })
}

/// Collapse the bot's "I need ..." chat lines into one sentence.
///
/// Returns an empty string when no chat line names a missing item.
pub fn summarize_chatlog(events: &[GameEvent]) -> String {
    let mut needs: Vec<String> = Vec::new();
    for event in events.iter().filter(|e| e.kind() == "onChat") {
        let Some(message) = event.data().get("onChat").and_then(Value::as_str) else {
            continue;
        };
        if let Some(item) = needed_item(message) {
            if !item.is_empty() && !needs.contains(&item) {
                needs.push(item);
            }
        }
    }

    if needs.is_empty() {
        String::new()
    } else {
        format!("I also need {}.", needs.join(", "))
    }
}

/// Handle to a session shared between agents
#[derive(Clone, Default)]
pub struct SessionHandle {
    inner: Arc<GameSession>,
}

impl SessionHandle {
    pub fn new(session: GameSession) -> Self {
        Self {
            inner: Arc::new(session),
        }
    }
}

impl std::ops::Deref for SessionHandle {
    type Target = GameSession;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}
