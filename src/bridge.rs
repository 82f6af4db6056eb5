//! Game bridge seam - runs scripts inside the game and reports what happened

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::config::BridgeConfig;

/// One event reported by the game, encoded on the wire as `[kind, data]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEvent(pub String, pub Value);

impl GameEvent {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self(kind.into(), data)
    }

    pub fn kind(&self) -> &str {
        &self.0
    }

    pub fn data(&self) -> &Value {
        &self.1
    }
}

/// Failures talking to the game bridge. All of them are worth retrying by the caller.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Bridge request failed: {0}")]
    Transport(String),

    #[error("Bridge returned status {0}")]
    Status(u16),

    #[error("Bridge response could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait GameBridge: Send + Sync {
    /// Run `code` with `programs` loaded and return the resulting events
    async fn step(&self, code: &str, programs: &str) -> Result<Vec<GameEvent>, BridgeError>;
}

#[derive(Serialize)]
struct StepRequest<'a> {
    code: &'a str,
    programs: &'a str,
}

/// HTTP client for the bridge's `POST /step` endpoint
#[derive(Debug, Clone)]
pub struct HttpBridge {
    client: Client,
    server: String,
    timeout: Duration,
}

impl HttpBridge {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            client: Client::new(),
            server: config.server.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }
}

#[async_trait]
impl GameBridge for HttpBridge {
    #[instrument(skip_all, fields(server = %self.server))]
    async fn step(&self, code: &str, programs: &str) -> Result<Vec<GameEvent>, BridgeError> {
        let response = self
            .client
            .post(format!("{}/step", self.server))
            .json(&StepRequest { code, programs })
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to step game server");
                BridgeError::Transport(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(status = status.as_u16(), "Failed to step game server");
            return Err(BridgeError::Status(status.as_u16()));
        }

        let body: Value = response.json().await.map_err(|e| {
            error!(error = %e, "Failed to read game server response");
            BridgeError::Decode(e.to_string())
        })?;
        let events = decode_events(body)?;
        info!(count = events.len(), "Received game events");
        Ok(events)
    }
}

/// The bridge answers with the event list either inline or as a JSON string
pub fn decode_events(body: Value) -> Result<Vec<GameEvent>, BridgeError> {
    let value = match body {
        Value::String(inner) => {
            serde_json::from_str(&inner).map_err(|e| BridgeError::Decode(e.to_string()))?
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| BridgeError::Decode(e.to_string()))
}
