//! Team configuration

use serde::{Deserialize, Serialize};

use crate::error::KoboldError;

/// Top-level configuration for a team run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KoboldConfig {
    /// Number of orchestration rounds to run
    pub rounds: u32,
    pub validator: ValidatorConfig,
    pub bridge: BridgeConfig,
    pub model: ModelConfig,
}

impl Default for KoboldConfig {
    fn default() -> Self {
        Self {
            rounds: 3,
            validator: ValidatorConfig::default(),
            bridge: BridgeConfig::default(),
            model: ModelConfig::default(),
        }
    }
}

impl KoboldConfig {
    /// Parse a JSON document; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, KoboldError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| KoboldError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), KoboldError> {
        if self.validator.max_attempts == 0 {
            return Err(KoboldError::Config(
                "validator.max_attempts must be at least 1".into(),
            ));
        }
        if self.bridge.server.is_empty() {
            return Err(KoboldError::Config("bridge.server must not be empty".into()));
        }
        if self.model.endpoint.is_empty() {
            return Err(KoboldError::Config("model.endpoint must not be empty".into()));
        }
        Ok(())
    }
}

/// Script validation retry policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub max_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_ms: 1000,
        }
    }
}

/// Where the game bridge listens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub server: String,
    pub request_timeout_secs: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:3000".into(),
            request_timeout_secs: 600,
        }
    }
}

/// Language model endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Full URL of an Ollama-style generate endpoint
    pub endpoint: String,
    pub model: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:11434/api/generate".into(),
            model: "llama3".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = KoboldConfig::default();
        assert_eq!(config.rounds, 3);
        assert_eq!(config.validator.max_attempts, 3);
        assert_eq!(config.validator.retry_delay_ms, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = KoboldConfig::from_json_str(
            r#"{"rounds": 7, "bridge": {"server": "http://mc:3000"}}"#,
        )
        .unwrap();
        assert_eq!(config.rounds, 7);
        assert_eq!(config.bridge.server, "http://mc:3000");
        assert_eq!(config.bridge.request_timeout_secs, 600);
        assert_eq!(config.validator, ValidatorConfig::default());
    }

    #[test]
    fn test_invalid_config() {
        let err = KoboldConfig::from_json_str(r#"{"validator": {"max_attempts": 0}}"#).unwrap_err();
        assert!(matches!(err, KoboldError::Config(_)));

        let err = KoboldConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, KoboldError::Config(_)));
    }
}
