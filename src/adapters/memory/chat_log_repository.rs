//! In-memory chat log for tests and embedders.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, SessionId};
use crate::domain::session::ChatMessage;
use crate::ports::ChatLogRepository;

/// Vec-per-session message log with failure injection.
#[derive(Default)]
pub struct InMemoryChatLogRepository {
    messages: Mutex<HashMap<SessionId, Vec<ChatMessage>>>,
    failing: AtomicBool,
}

impl InMemoryChatLogRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every operation fails with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "chat log unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatLogRepository for InMemoryChatLogRepository {
    async fn append(&self, message: &ChatMessage) -> Result<(), DomainError> {
        self.check_available()?;
        self.messages
            .lock()
            .expect("chat log lock poisoned")
            .entry(*message.session_id())
            .or_default()
            .push(message.clone());
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, DomainError> {
        self.check_available()?;
        Ok(self
            .messages
            .lock()
            .expect("chat log lock poisoned")
            .get(session_id)
            .map(|v| {
                let skip = v.len().saturating_sub(limit as usize);
                v.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn delete_for_session(&self, session_id: &SessionId) -> Result<(), DomainError> {
        self.check_available()?;
        self.messages
            .lock()
            .expect("chat log lock poisoned")
            .remove(session_id);
        Ok(())
    }
}
