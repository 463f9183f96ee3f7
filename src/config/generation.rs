//! Generation service configuration section.

use serde::Deserialize;

use crate::ports::GenerationSettings;

use super::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier handed to the backend adapter.
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature. Structured extraction wants it low.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
        }
    }
}

impl From<&GenerationConfig> for GenerationSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.is_empty() {
            return Err(ConfigError::validation("generation.model", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::validation(
                "generation.temperature",
                "must be within [0.0, 2.0]",
            ));
        }
        Ok(())
    }
}
