//! Validation of generated bot scripts
//!
//! Model output is free-form text with JavaScript fences in it. Validation
//! turns it into a [`ValidatedProgram`]: the collected function declarations
//! plus a call to exactly one entry point, `await <name>(bot);`.
//!
//! The entry point is the *last* `async function` in declaration order, and it
//! must take a single parameter named `bot`. Synchronous functions are kept as
//! helpers but are never eligible as entry points.

pub mod extract;
pub mod parser;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::config::ValidatorConfig;

pub use extract::extract_code_blocks;
pub use parser::{parse_functions, FunctionDescriptor, FunctionKind};

/// The only parameter name accepted on an entry function
pub const BOT_PARAM: &str = "bot";

/// Total number of validation attempts before giving up
pub const MAX_ATTEMPTS: u32 = 3;

/// Pause between two validation attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Why a single validation attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("No functions found")]
    NoFunctions,

    #[error("No async function found. Your main function must be async.")]
    NoAsyncEntry,

    #[error("Main function {name} must take a single argument named 'bot'")]
    BadEntrySignature { name: String, params: Vec<String> },

    #[error("{message} (at offset {offset})")]
    Parse { offset: usize, message: String },
}

/// Validation gave up after exhausting its attempts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Error parsing action response (before program execution): {last_error}")]
pub struct ValidationFailure {
    pub attempts: u32,
    pub last_error: ScriptError,
}

/// A script that is guaranteed to have one well-formed entry point
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedProgram {
    /// Every declaration, helpers and entry, separated by blank lines
    pub program_code: String,
    /// Always `await <program_name>(bot);`
    pub exec_code: String,
    /// Name of the entry function
    pub program_name: String,
}

impl ValidatedProgram {
    /// Program code followed by the entry invocation, ready to send to the bot
    pub fn runnable(&self) -> String {
        format!("{}\n{}", self.program_code, self.exec_code)
    }
}

/// Run one validation attempt over `text`
pub fn validate_script(text: &str) -> Result<ValidatedProgram, ScriptError> {
    let code = extract_code_blocks(text);
    let functions = parse_functions(&code)?;
    if functions.is_empty() {
        return Err(ScriptError::NoFunctions);
    }

    let entry = functions
        .iter()
        .rev()
        .find(|f| f.is_async())
        .ok_or(ScriptError::NoAsyncEntry)?;

    if entry.params.len() != 1 || entry.params[0] != BOT_PARAM {
        return Err(ScriptError::BadEntrySignature {
            name: entry.name.clone(),
            params: entry.params.clone(),
        });
    }

    let program_code = functions
        .iter()
        .map(|f| f.body.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    Ok(ValidatedProgram {
        program_code,
        exec_code: format!("await {}({BOT_PARAM});", entry.name),
        program_name: entry.name.clone(),
    })
}

/// Pause used between validation attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Validates generated scripts with a bounded number of attempts.
///
/// Each attempt re-runs extraction and parsing on the same text; the model is
/// never asked again from here.
#[derive(Clone)]
pub struct ScriptValidator {
    max_attempts: u32,
    retry_delay: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl ScriptValidator {
    pub fn new() -> Self {
        Self {
            max_attempts: MAX_ATTEMPTS,
            retry_delay: RETRY_DELAY,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn from_config(config: &ValidatorConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Validate `text`, retrying after a fixed delay until the attempts run out
    #[instrument(skip_all, fields(len = text.len()))]
    pub async fn validate(&self, text: &str) -> Result<ValidatedProgram, ValidationFailure> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match validate_script(text) {
                Ok(program) => {
                    debug!(attempt, program = %program.program_name, "Script validated");
                    return Ok(program);
                }
                Err(error) if attempt >= self.max_attempts => {
                    warn!(attempt, error = %error, "Giving up on script validation");
                    return Err(ValidationFailure {
                        attempts: attempt,
                        last_error: error,
                    });
                }
                Err(error) => {
                    warn!(attempt, error = %error, "Script validation failed, retrying");
                    self.sleeper.sleep(self.retry_delay).await;
                }
            }
        }
    }
}

impl Default for ScriptValidator {
    fn default() -> Self {
        Self::new()
    }
}
