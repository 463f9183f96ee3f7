//! Typed form state exchanged with the generation service.
//!
//! # Design
//!
//! Every field carries `#[serde(default)]` so a partial response from
//! the generation service still deserializes; missing fields fall back
//! to their empty values rather than failing the whole turn. `{}` is a
//! valid document and yields the initial state.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Confidence, DomainError, ErrorCode, FormPhase, Progress};

use super::FormModel;

/// Complete conversational state of one form-filling session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound = "F: FormModel")]
pub struct FormState<F: FormModel> {
    /// The form being filled.
    #[serde(default)]
    pub form: F,

    /// Completion percentage reported by the generation service.
    #[serde(default)]
    pub progress: Progress,

    /// The question the user was last asked.
    #[serde(default)]
    pub prev_question: String,

    /// The user's answer to that question.
    #[serde(default)]
    pub prev_answer: String,

    /// Feedback on the latest answer.
    #[serde(default)]
    pub feedback: String,

    /// Self-assessed confidence for the latest extraction.
    #[serde(default)]
    pub confidence: Confidence,

    /// The next question to put to the user.
    #[serde(default)]
    pub next_question: String,

    /// Why that question was chosen.
    #[serde(default)]
    pub next_question_explanation: String,

    /// Detected user language, if the service reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_language: Option<String>,
}

impl<F: FormModel> Default for FormState<F> {
    fn default() -> Self {
        Self {
            form: F::default(),
            progress: Progress::ZERO,
            prev_question: String::new(),
            prev_answer: String::new(),
            feedback: String::new(),
            confidence: Confidence::ZERO,
            next_question: String::new(),
            next_question_explanation: String::new(),
            user_language: None,
        }
    }
}

impl<F: FormModel> FormState<F> {
    /// Returns the completion phase for this state.
    pub fn phase(&self) -> FormPhase {
        self.progress.phase()
    }

    /// Serializes the state into the snapshot document shape.
    pub fn to_document(&self) -> Result<serde_json::Value, DomainError> {
        serde_json::to_value(self).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationFailed,
                format!("Failed to serialize form state: {}", e),
            )
        })
    }

    /// Restores a state from a snapshot document.
    ///
    /// A document that does not match the schema is a restore failure,
    /// which callers are expected to degrade to a fresh state.
    pub fn from_document(document: &serde_json::Value) -> Result<Self, DomainError> {
        serde_json::from_value(document.clone()).map_err(|e| {
            DomainError::new(
                ErrorCode::StateRestoreFailed,
                format!("Failed to restore form state: {}", e),
            )
            .with_detail("schema", F::schema_name())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::form::FieldSpec;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
    struct TinyForm {
        #[serde(default)]
        idea: String,
    }

    impl FormModel for TinyForm {
        fn schema_name() -> &'static str {
            "TinyForm"
        }

        fn field_specs() -> Vec<FieldSpec> {
            vec![FieldSpec::new("idea", "string", "The idea")]
        }
    }

    #[test]
    fn empty_document_yields_default_state() {
        let state: FormState<TinyForm> = serde_json::from_value(json!({})).unwrap();
        assert_eq!(state, FormState::default());
        assert_eq!(state.phase(), FormPhase::Empty);
    }

    #[test]
    fn partial_document_fills_missing_fields() {
        let state: FormState<TinyForm> = serde_json::from_value(json!({
            "progress": 30,
            "next_question": "What is your market?"
        }))
        .unwrap();
        assert_eq!(state.progress.value(), 30);
        assert_eq!(state.next_question, "What is your market?");
        assert!(state.prev_question.is_empty());
    }

    #[test]
    fn document_round_trip_preserves_all_fields() {
        let mut state: FormState<TinyForm> = FormState::default();
        state.form.idea = "solar drones".to_string();
        state.progress = Progress::new(45);
        state.prev_question = "What do you build?".to_string();
        state.prev_answer = "solar drones".to_string();
        state.feedback = "Clear answer".to_string();
        state.confidence = Confidence::new(0.9);
        state.next_question = "Who buys them?".to_string();
        state.next_question_explanation = "Market is unknown".to_string();
        state.user_language = Some("en".to_string());

        let doc = state.to_document().unwrap();
        let restored = FormState::<TinyForm>::from_document(&doc).unwrap();
        assert_eq!(state, restored);
    }

    #[test]
    fn corrupt_form_field_is_restore_failure() {
        let doc = json!({"form": "not an object", "progress": 10});
        let err = FormState::<TinyForm>::from_document(&doc).unwrap_err();
        assert!(err.is_restore_failure());
    }

    #[test]
    fn out_of_range_progress_is_clamped_on_restore() {
        let state: FormState<TinyForm> =
            serde_json::from_value(json!({"progress": 400})).unwrap();
        assert_eq!(state.progress.value(), 100);
    }
}
