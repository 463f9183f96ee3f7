//! Session aggregate.
//!
//! # Invariants
//!
//! - `last_active` never moves backwards.
//! - A closed session stays closed; closing is not reversible through
//!   the aggregate.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ClientId, SessionId, Timestamp, UserId, ValidationError};

/// A form-filling session owned by one user within one client surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    user_id: UserId,
    client_id: ClientId,
    form_schema: String,
    active: bool,
    created_at: Timestamp,
    last_active: Timestamp,
}

impl Session {
    /// Creates a new active session with a fresh id.
    pub fn new(
        user_id: UserId,
        client_id: ClientId,
        form_schema: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let form_schema = form_schema.into();
        if form_schema.is_empty() {
            return Err(ValidationError::empty_field("form_schema"));
        }
        let now = Timestamp::now();
        Ok(Self {
            id: SessionId::new(),
            user_id,
            client_id,
            form_schema,
            active: true,
            created_at: now,
            last_active: now,
        })
    }

    /// Reconstitutes a session from persisted state. No validation;
    /// the persistence layer is trusted.
    pub fn reconstitute(
        id: SessionId,
        user_id: UserId,
        client_id: ClientId,
        form_schema: String,
        active: bool,
        created_at: Timestamp,
        last_active: Timestamp,
    ) -> Self {
        Self {
            id,
            user_id,
            client_id,
            form_schema,
            active,
            created_at,
            last_active,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn form_schema(&self) -> &str {
        &self.form_schema
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    pub fn last_active(&self) -> &Timestamp {
        &self.last_active
    }

    /// Records activity on the session, advancing `last_active`.
    pub fn touch(&mut self) {
        let now = Timestamp::now();
        if now.is_after(&self.last_active) {
            self.last_active = now;
        }
    }

    /// Marks the session as closed.
    pub fn close(&mut self) {
        self.active = false;
    }
}
