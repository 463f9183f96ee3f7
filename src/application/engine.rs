//! Progress form engine: dirty-tracked in-memory state over the store.
//!
//! # Design
//!
//! The engine owns one `FormState<F>` and a dirty flag. Form turns go
//! through the generation service, mutate the in-memory state, and
//! persist through the store. Restore failures never escape
//! `refresh_current_state`; the engine degrades to a fresh state and
//! carries on, because a corrupt snapshot must not brick a session.
//!
//! Construction is two-step: `new` does no I/O, `initialize` binds or
//! creates the session and loads state.

use std::sync::Arc;

use crate::domain::form::{FormModel, FormState};
use crate::domain::foundation::{
    ClientId, DomainError, ErrorCode, FormPhase, Progress, SessionId, UserId,
};
use crate::domain::session::{MessageRole, Session, StateSnapshot};
use crate::ports::{
    GenerationError, GenerationRequest, GenerationService, GenerationSettings, ResponseSchema,
};

use super::error::EngineError;
use super::session_store::SessionStore;

const DEFAULT_INSTRUCTIONS: &str = "You are filling out a form on the user's behalf through \
conversation. Extract everything relevant from the user's message into the form fields, \
update the completion progress, give brief feedback on the answer, and choose the next \
question to ask. Respond only with the updated state document.";

/// Tunable prompt content for an engine.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// System instruction block.
    pub instructions: String,
    /// Extra rules appended as their own labeled block.
    pub house_rules: Option<String>,
    /// Standing description of the form's purpose, if the schema's
    /// field descriptions are not enough.
    pub form_prompt: Option<String>,
    /// Sampling parameters stamped onto every request, usually built
    /// from [`crate::config::GenerationConfig`].
    pub generation: Option<GenerationSettings>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            house_rules: None,
            form_prompt: None,
            generation: None,
        }
    }
}

pub struct ProgressFormEngine<F: FormModel> {
    store: SessionStore,
    service: Arc<dyn GenerationService>,
    options: EngineOptions,
    state: FormState<F>,
    dirty: bool,
}

impl<F: FormModel> ProgressFormEngine<F> {
    /// Creates an engine without touching any backend.
    pub fn new(
        store: SessionStore,
        service: Arc<dyn GenerationService>,
        options: EngineOptions,
    ) -> Self {
        Self {
            store,
            service,
            options,
            state: FormState::default(),
            dirty: false,
        }
    }

    /// Binds or creates the session and loads its latest state.
    ///
    /// With an explicit unknown session id this fails; with `None` a
    /// fresh session is created.
    pub async fn initialize(
        &mut self,
        session_id: Option<SessionId>,
        user_id: UserId,
        client_id: ClientId,
    ) -> Result<SessionId, EngineError> {
        let id = self
            .store
            .get_or_create_session(session_id, user_id, client_id, F::schema_name())
            .await?;
        self.refresh_current_state().await?;
        Ok(id)
    }

    /// Reloads state from the latest snapshot.
    ///
    /// Returns true when a snapshot was restored. A missing snapshot
    /// yields the default state. A corrupt or unreadable snapshot is
    /// logged, replaced with the default state, and marked dirty so
    /// the next save repairs the stored latest; repository outages
    /// still propagate.
    pub async fn refresh_current_state(&mut self) -> Result<bool, EngineError> {
        let restored = match self.store.get_latest_snapshot(true).await {
            Ok(Some(snapshot)) => match FormState::from_document(snapshot.state()) {
                Ok(state) => {
                    self.state = state;
                    self.dirty = false;
                    true
                }
                Err(e) => {
                    self.degrade_to_fresh(&e);
                    false
                }
            },
            Ok(None) => {
                self.state = FormState::default();
                self.dirty = false;
                false
            }
            Err(e) if e.is_restore_failure() => {
                self.degrade_to_fresh(&e);
                false
            }
            Err(e) => return Err(e.into()),
        };
        Ok(restored)
    }

    fn degrade_to_fresh(&mut self, error: &DomainError) {
        tracing::warn!(
            session_id = ?self.store.bound_session_id(),
            error = %error,
            "stored state unusable, starting from a fresh form"
        );
        self.state = FormState::default();
        self.dirty = true;
    }

    /// Runs one conversational turn and persists the result.
    pub async fn process_form(&mut self, message: &str) -> Result<FormState<F>, EngineError> {
        self.require_binding()?;
        // Unsaved local changes (a seeded question, a failed save
        // awaiting retry) take precedence over the stored snapshot.
        if !self.dirty {
            self.refresh_current_state().await?;
        }
        self.run_form_turn(message).await?;
        self.save_current_state(false).await?;
        self.log_turn(message).await;
        Ok(self.state.clone())
    }

    /// Runs several turns, persisting only after the last one.
    pub async fn process_form_batch(
        &mut self,
        messages: &[String],
    ) -> Result<FormState<F>, EngineError> {
        self.require_binding()?;
        if !self.dirty {
            self.refresh_current_state().await?;
        }
        for message in messages {
            self.run_form_turn(message).await?;
            self.log_turn(message).await;
        }
        self.save_current_state(false).await?;
        Ok(self.state.clone())
    }

    async fn run_form_turn(&mut self, message: &str) -> Result<(), EngineError> {
        let request = self.build_form_request(message)?;
        let response = self.service.generate(&request).await?;

        let mut new_state: FormState<F> = serde_json::from_value(response).map_err(|e| {
            GenerationError::Validation(format!("response does not match state schema: {}", e))
        })?;

        new_state.prev_question = std::mem::take(&mut self.state.next_question);
        new_state.prev_answer = message.to_string();

        if new_state.progress < self.state.progress {
            tracing::debug!(
                from = %self.state.progress,
                to = %new_state.progress,
                "progress regressed"
            );
        }

        self.state = new_state;
        self.dirty = true;
        Ok(())
    }

    fn build_form_request(&self, message: &str) -> Result<GenerationRequest, EngineError> {
        let fields = F::field_specs();
        let structure = fields
            .iter()
            .map(|f| format!("- {} ({}): {}", f.name, f.ty, f.description))
            .collect::<Vec<_>>()
            .join("\n");
        let current = serde_json::to_string_pretty(&self.state).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationFailed,
                format!("Failed to render current state: {}", e),
            )
        })?;

        let mut request = GenerationRequest::new(ResponseSchema::new(F::schema_name(), fields))
            .system(self.options.instructions.clone())
            .block("FORM_STRUCTURE", structure)
            .block("CURRENT_STATE", current);
        if let Some(settings) = &self.options.generation {
            request = request.with_settings(settings.clone());
        }
        if let Some(prompt) = &self.options.form_prompt {
            request = request.block("FORM_PROMPT", prompt.clone());
        }
        if let Some(rules) = &self.options.house_rules {
            request = request.block("CUSTOM_RULES", rules.clone());
        }
        Ok(request.user(message))
    }

    /// Audit logging is best-effort; a full log never fails a turn.
    async fn log_turn(&self, message: &str) {
        if let Err(e) = self.store.log_message(MessageRole::User, message).await {
            tracing::warn!(error = %e, "failed to log user message");
        }
        if !self.state.next_question.is_empty() {
            if let Err(e) = self
                .store
                .log_message(MessageRole::Assistant, &self.state.next_question)
                .await
            {
                tracing::warn!(error = %e, "failed to log assistant message");
            }
        }
    }

    /// Persists the in-memory state if it has unsaved changes.
    ///
    /// Returns true when a snapshot was written. With `force` a clean
    /// state is written anyway. The dirty flag is only cleared on a
    /// successful write, so a failed save retries on the next call.
    pub async fn save_current_state(&mut self, force: bool) -> Result<bool, EngineError> {
        if !self.dirty && !force {
            return Ok(false);
        }
        let document = self.state.to_document()?;
        self.store
            .save_snapshot(document, self.state.progress)
            .await?;
        self.dirty = false;
        Ok(true)
    }

    /// Seeds the opening question on a state that has none yet.
    pub fn seed_question(&mut self, text: &str) {
        if self.state.next_question.is_empty() {
            self.state.next_question = text.to_string();
            self.dirty = true;
        }
    }

    /// Rebinds the engine to another session for the guard's
    /// lifetime. In-memory state, dirty flag, and store binding all
    /// come back when the guard drops, even during a panic.
    pub async fn temporary_session(
        &mut self,
        target: SessionId,
    ) -> Result<TemporarySession<'_, F>, EngineError> {
        let prior_binding = self.store.take_binding();
        if let Err(e) = self.store.bind_session(target).await {
            self.store.restore_binding(prior_binding);
            return Err(e.into());
        }

        let prior_state = std::mem::take(&mut self.state);
        let prior_dirty = std::mem::replace(&mut self.dirty, false);

        let mut guard = TemporarySession {
            engine: self,
            prior_binding,
            prior_state,
            prior_dirty,
        };
        guard.engine.refresh_current_state().await?;
        Ok(guard)
    }

    /// Snapshot history of another session, without disturbing the
    /// caller's binding or in-memory state. `limit` bounds the result
    /// when given.
    pub async fn get_session_history(
        &mut self,
        target: SessionId,
        limit: Option<u32>,
    ) -> Result<Vec<StateSnapshot>, EngineError> {
        let guard = self.temporary_session(target).await?;
        let history = guard.store().get_snapshot_history(limit).await?;
        Ok(history)
    }

    fn require_binding(&self) -> Result<(), EngineError> {
        if self.store.bound_session_id().is_none() {
            return Err(DomainError::new(
                ErrorCode::NoSessionBound,
                "Engine is not initialized with a session",
            )
            .into());
        }
        Ok(())
    }

    pub fn state(&self) -> &FormState<F> {
        &self.state
    }

    pub fn progress(&self) -> Progress {
        self.state.progress
    }

    pub fn phase(&self) -> FormPhase {
        self.state.phase()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SessionStore {
        &mut self.store
    }

    pub fn generation_service(&self) -> &Arc<dyn GenerationService> {
        &self.service
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }
}

/// RAII guard for an engine temporarily rebound to another session.
pub struct TemporarySession<'a, F: FormModel> {
    engine: &'a mut ProgressFormEngine<F>,
    prior_binding: Option<Session>,
    prior_state: FormState<F>,
    prior_dirty: bool,
}

impl<F: FormModel> std::ops::Deref for TemporarySession<'_, F> {
    type Target = ProgressFormEngine<F>;

    fn deref(&self) -> &Self::Target {
        self.engine
    }
}

impl<F: FormModel> std::ops::DerefMut for TemporarySession<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.engine
    }
}

impl<F: FormModel> Drop for TemporarySession<'_, F> {
    fn drop(&mut self) {
        self.engine.state = std::mem::take(&mut self.prior_state);
        self.engine.dirty = self.prior_dirty;
        self.engine.store.restore_binding(self.prior_binding.take());
    }
}
