//! Tool registry and message orchestration.
//!
//! # Design
//!
//! Tools are explicit descriptors: a name, a description shown to the
//! classifier, and a handler. Nothing is discovered by introspection.
//! `determine_action` asks the generation service which tool fits the
//! message; an unknown answer falls back to the default form-update
//! tool rather than failing the turn.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::domain::form::{FieldSpec, FormModel, FormState};
use crate::domain::foundation::{Confidence, DomainError, ErrorCode};
use crate::ports::{GenerationRequest, ResponseSchema};

use super::engine::ProgressFormEngine;
use super::error::EngineError;

/// Name of the implicit form-update tool.
pub const UPDATE_FORM_TOOL: &str = "update_form";

const CLASSIFIER_INSTRUCTIONS: &str = "Choose the single tool that best handles the user's \
message, given the tool list and the current form state. Answer with the tool name, your \
confidence, and one sentence of reasoning.";

/// What running a tool produced.
#[derive(Debug, Clone)]
pub enum ToolOutcome<F: FormModel> {
    /// The form state advanced.
    FormUpdate(FormState<F>),
    /// A custom tool produced its own result document.
    Custom {
        tool_name: String,
        value: serde_json::Value,
    },
}

/// Behavior behind a registered tool.
#[async_trait]
pub trait ToolHandler<F: FormModel>: Send + Sync {
    async fn run(
        &self,
        engine: &mut ProgressFormEngine<F>,
        message: &str,
    ) -> Result<ToolOutcome<F>, EngineError>;
}

/// One registered tool.
#[derive(Clone)]
pub struct ToolDescriptor<F: FormModel> {
    pub name: String,
    pub description: String,
    pub handler: Arc<dyn ToolHandler<F>>,
}

impl<F: FormModel> ToolDescriptor<F> {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn ToolHandler<F>>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            handler,
        }
    }
}

/// Default tool: one ordinary form turn.
struct UpdateFormTool;

#[async_trait]
impl<F: FormModel> ToolHandler<F> for UpdateFormTool {
    async fn run(
        &self,
        engine: &mut ProgressFormEngine<F>,
        message: &str,
    ) -> Result<ToolOutcome<F>, EngineError> {
        let state = engine.process_form(message).await?;
        Ok(ToolOutcome::FormUpdate(state))
    }
}

/// Named tool set, validated at construction.
pub struct ToolRegistry<F: FormModel> {
    tools: Vec<ToolDescriptor<F>>,
    index: HashMap<String, usize>,
}

impl<F: FormModel> ToolRegistry<F> {
    /// Builds a registry from explicit descriptors.
    ///
    /// Fails on an empty descriptor list or any empty description,
    /// because the classifier has nothing to go on then. The default
    /// `update_form` tool is prepended when the list does not carry
    /// one of its own.
    pub fn new(descriptors: Vec<ToolDescriptor<F>>) -> Result<Self, DomainError> {
        if descriptors.is_empty() {
            return Err(DomainError::new(
                ErrorCode::ConfigurationInvalid,
                "Tool registry needs at least one tool descriptor",
            ));
        }

        let mut tools = Vec::with_capacity(descriptors.len() + 1);
        if !descriptors.iter().any(|d| d.name == UPDATE_FORM_TOOL) {
            tools.push(ToolDescriptor::new(
                UPDATE_FORM_TOOL,
                "Record the user's message into the form and ask the next question. \
                 Use when no other tool applies.",
                Arc::new(UpdateFormTool) as Arc<dyn ToolHandler<F>>,
            ));
        }
        tools.extend(descriptors);

        let mut index = HashMap::new();
        for (i, tool) in tools.iter().enumerate() {
            if tool.name.is_empty() {
                return Err(DomainError::new(
                    ErrorCode::ConfigurationInvalid,
                    "Tool descriptor has an empty name",
                ));
            }
            if tool.description.is_empty() {
                return Err(DomainError::new(
                    ErrorCode::ConfigurationInvalid,
                    format!("Tool '{}' has an empty description", tool.name),
                ));
            }
            if index.insert(tool.name.clone(), i).is_some() {
                return Err(DomainError::new(
                    ErrorCode::ConfigurationInvalid,
                    format!("Tool '{}' is registered twice", tool.name),
                ));
            }
        }

        Ok(Self { tools, index })
    }

    /// Builds a registry holding only the default tool.
    pub fn default_only() -> Self {
        Self::new(vec![ToolDescriptor::new(
            UPDATE_FORM_TOOL,
            "Record the user's message into the form and ask the next question.",
            Arc::new(UpdateFormTool) as Arc<dyn ToolHandler<F>>,
        )])
        .unwrap_or_else(|_| unreachable!("default descriptor is valid"))
    }

    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    fn get(&self, name: &str) -> Option<&ToolDescriptor<F>> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    fn default_tool(&self) -> &ToolDescriptor<F> {
        self.get(UPDATE_FORM_TOOL)
            .unwrap_or(&self.tools[0])
    }

    fn render_catalog(&self) -> String {
        self.tools
            .iter()
            .map(|t| format!("- {}: {}", t.name, t.description))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Classifier response shape.
#[derive(Debug, Deserialize)]
struct ToolSelection {
    #[serde(default)]
    tool_name: String,
    #[serde(default)]
    confidence: Confidence,
    #[serde(default)]
    reasoning: String,
}

/// Engine plus registry: routes each message through the right tool.
pub struct FormOrchestrator<F: FormModel> {
    engine: ProgressFormEngine<F>,
    registry: ToolRegistry<F>,
}

impl<F: FormModel> FormOrchestrator<F> {
    pub fn new(engine: ProgressFormEngine<F>, registry: ToolRegistry<F>) -> Self {
        Self { engine, registry }
    }

    /// Classifies the message, runs the selected tool, and persists
    /// any state the tool left dirty.
    pub async fn determine_action(&mut self, message: &str) -> Result<ToolOutcome<F>, EngineError> {
        let selection = self.classify(message).await?;

        tracing::debug!(
            tool = %selection.tool_name,
            confidence = %selection.confidence,
            reasoning = %selection.reasoning,
            "tool selected"
        );

        let descriptor = match self.registry.get(&selection.tool_name) {
            Some(d) => d.clone(),
            None => {
                tracing::error!(
                    tool = %selection.tool_name,
                    "classifier chose an unknown tool, falling back to the default"
                );
                self.registry.default_tool().clone()
            }
        };

        let outcome = descriptor.handler.run(&mut self.engine, message).await?;
        self.engine.save_current_state(false).await?;
        Ok(outcome)
    }

    async fn classify(&self, message: &str) -> Result<ToolSelection, EngineError> {
        let schema = ResponseSchema::new(
            "ToolSelection",
            vec![
                FieldSpec::new("tool_name", "string", "Name of the chosen tool"),
                FieldSpec::new("confidence", "number", "Confidence in [0, 1]"),
                FieldSpec::new("reasoning", "string", "One sentence of reasoning"),
            ],
        );
        let current = serde_json::to_string_pretty(self.engine.state()).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationFailed,
                format!("Failed to render current state: {}", e),
            )
        })?;

        let mut request = GenerationRequest::new(schema)
            .system(CLASSIFIER_INSTRUCTIONS)
            .block("TOOLS", self.registry.render_catalog())
            .block("CURRENT_STATE", current);
        if let Some(settings) = &self.engine.options().generation {
            request = request.with_settings(settings.clone());
        }
        let request = request.user(message);

        let response = self.engine.generation_service().generate(&request).await?;
        // A malformed selection degrades to the default tool rather
        // than failing the message.
        Ok(serde_json::from_value(response).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "unusable tool selection, using the default tool");
            ToolSelection {
                tool_name: UPDATE_FORM_TOOL.to_string(),
                confidence: Confidence::ZERO,
                reasoning: String::new(),
            }
        }))
    }

    pub fn engine(&self) -> &ProgressFormEngine<F> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ProgressFormEngine<F> {
        &mut self.engine
    }

    pub fn registry(&self) -> &ToolRegistry<F> {
        &self.registry
    }
}
