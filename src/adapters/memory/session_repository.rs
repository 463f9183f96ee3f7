//! In-memory session repository for tests and embedders.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, SessionId};
use crate::domain::session::Session;
use crate::ports::SessionRepository;

/// HashMap-backed session store with write counting and failure
/// injection for outage tests.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: Mutex<HashMap<SessionId, Session>>,
    write_count: AtomicUsize,
    failing: AtomicBool,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of writes accepted so far.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    /// When set, every operation fails with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "session repository unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn save(&self, session: &Session) -> Result<(), DomainError> {
        self.check_available()?;
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .insert(*session.id(), session.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        self.check_available()?;
        Ok(self
            .sessions
            .lock()
            .expect("session map lock poisoned")
            .get(id)
            .cloned())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), DomainError> {
        self.check_available()?;
        self.sessions
            .lock()
            .expect("session map lock poisoned")
            .remove(id);
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ClientId, UserId};

    fn sample_session() -> Session {
        Session::new(
            UserId::new("user-1").unwrap(),
            ClientId::new("client").unwrap(),
            "StartupForm",
        )
        .unwrap()
    }

    #[tokio::test]
    async fn save_and_find_round_trip() {
        let repo = InMemorySessionRepository::new();
        let session = sample_session();
        repo.save(&session).await.unwrap();

        let found = repo.find_by_id(session.id()).await.unwrap().unwrap();
        assert_eq!(found, session);
        assert_eq!(repo.write_count(), 1);
    }

    #[tokio::test]
    async fn find_missing_returns_none() {
        let repo = InMemorySessionRepository::new();
        assert!(repo.find_by_id(&SessionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_repo_rejects_operations() {
        let repo = InMemorySessionRepository::new();
        repo.set_failing(true);
        let err = repo.save(&sample_session()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DatabaseError);
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let repo = InMemorySessionRepository::new();
        let session = sample_session();
        repo.save(&session).await.unwrap();
        repo.delete(session.id()).await.unwrap();
        assert!(repo.find_by_id(session.id()).await.unwrap().is_none());
    }
}
