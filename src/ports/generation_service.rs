//! Generation service port.
//!
//! # Design
//!
//! The engine talks to any LLM backend through this trait. Requests
//! are an ordered list of prompt blocks plus a response schema; the
//! service returns a raw JSON document which the caller deserializes
//! against its own types. Errors are propagated unchanged; retries and
//! budgets belong to the adapter, not to the engine.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::form::FieldSpec;

/// Failures raised by a generation backend.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("Generation response failed validation: {0}")]
    Validation(String),

    #[error("Network error talking to generation backend: {0}")]
    Network(String),

    #[error("Generation backend rate limited the request (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("Generation backend rejected credentials: {0}")]
    Authentication(String),

    #[error("Generation budget exceeded: {0}")]
    BudgetExceeded(String),
}

/// One block of prompt content, rendered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptBlock {
    /// System instructions.
    System(String),
    /// A labeled context section, e.g. the current form state.
    Labeled { label: String, content: String },
    /// The user's message.
    User(String),
}

/// Backend sampling parameters attached to a request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
}

/// Shape the response document must conform to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

/// A fully assembled generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    blocks: Vec<PromptBlock>,
    response_schema: ResponseSchema,
    settings: Option<GenerationSettings>,
}

impl GenerationRequest {
    pub fn new(response_schema: ResponseSchema) -> Self {
        Self {
            blocks: Vec::new(),
            response_schema,
            settings: None,
        }
    }

    /// Attaches backend sampling parameters.
    pub fn with_settings(mut self, settings: GenerationSettings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Appends a system instruction block.
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.blocks.push(PromptBlock::System(content.into()));
        self
    }

    /// Appends a labeled context block.
    pub fn block(mut self, label: impl Into<String>, content: impl Into<String>) -> Self {
        self.blocks.push(PromptBlock::Labeled {
            label: label.into(),
            content: content.into(),
        });
        self
    }

    /// Appends the user message block.
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.blocks.push(PromptBlock::User(content.into()));
        self
    }

    pub fn blocks(&self) -> &[PromptBlock] {
        &self.blocks
    }

    pub fn response_schema(&self) -> &ResponseSchema {
        &self.response_schema
    }

    pub fn settings(&self) -> Option<&GenerationSettings> {
        self.settings.as_ref()
    }

    /// Returns the content of the user block, if one was added.
    pub fn user_message(&self) -> Option<&str> {
        self.blocks.iter().rev().find_map(|b| match b {
            PromptBlock::User(content) => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Any backend that can turn a request into a structured JSON document.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerationError>;
}
