//! Session persistence port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SessionId};
use crate::domain::session::Session;

/// Persistence operations for session rows.
///
/// Implementations return plain value objects; no persistence types
/// leak through this boundary.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Inserts or updates a session.
    async fn save(&self, session: &Session) -> Result<(), DomainError>;

    /// Finds a session by its id.
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError>;

    /// Deletes a session row. Child rows must already be gone.
    async fn delete(&self, id: &SessionId) -> Result<(), DomainError>;
}
