//! Chat message audit log port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SessionId};
use crate::domain::session::ChatMessage;

/// Append-only audit log of conversation messages.
///
/// The log is write-mostly; state restoration never reads it.
#[async_trait]
pub trait ChatLogRepository: Send + Sync {
    /// Appends a message to the session's log.
    async fn append(&self, message: &ChatMessage) -> Result<(), DomainError>;

    /// Returns the most recent messages for a session, oldest first.
    async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, DomainError>;

    /// Deletes all messages belonging to a session.
    async fn delete_for_session(&self, session_id: &SessionId) -> Result<(), DomainError>;
}
