//! Language model seam

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::ModelConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Model unavailable: {0}")]
    Unavailable(String),
}

/// Anything that can answer a prompt with text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client for an Ollama-style `POST /api/generate` endpoint
#[derive(Debug, Clone)]
pub struct OllamaModel {
    client: Client,
    config: ModelConfig,
}

impl OllamaModel {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl LanguageModel for OllamaModel {
    async fn ask(&self, prompt: &str) -> Result<String, LlmError> {
        debug!(model = %self.config.model, len = prompt.len(), "Querying model");
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| LlmError::Unavailable(e.to_string()))?
            .json::<GenerateResponse>()
            .await
            .map_err(|e| LlmError::Unavailable(format!("undecodable response: {e}")))?;

        Ok(response.response)
    }
}
