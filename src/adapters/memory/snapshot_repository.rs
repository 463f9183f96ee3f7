//! In-memory snapshot repository for tests and embedders.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::domain::foundation::{DomainError, ErrorCode, SessionId};
use crate::domain::session::StateSnapshot;
use crate::ports::SnapshotRepository;

/// Vec-per-session snapshot store, append-only like the real adapter,
/// with write counting and failure injection.
#[derive(Default)]
pub struct InMemorySnapshotRepository {
    snapshots: Mutex<HashMap<SessionId, Vec<StateSnapshot>>>,
    write_count: AtomicUsize,
    failing: AtomicBool,
}

impl InMemorySnapshotRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of appends accepted so far.
    pub fn write_count(&self) -> usize {
        self.write_count.load(Ordering::SeqCst)
    }

    /// When set, every operation fails with a database error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Total snapshots stored for a session.
    pub fn count_for(&self, session_id: &SessionId) -> usize {
        self.snapshots
            .lock()
            .expect("snapshot map lock poisoned")
            .get(session_id)
            .map_or(0, Vec::len)
    }

    fn check_available(&self) -> Result<(), DomainError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::DatabaseError,
                "snapshot repository unavailable",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotRepository for InMemorySnapshotRepository {
    async fn append(&self, snapshot: &StateSnapshot) -> Result<(), DomainError> {
        self.check_available()?;
        self.snapshots
            .lock()
            .expect("snapshot map lock poisoned")
            .entry(*snapshot.session_id())
            .or_default()
            .push(snapshot.clone());
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn latest(&self, session_id: &SessionId) -> Result<Option<StateSnapshot>, DomainError> {
        self.check_available()?;
        // Insertion order doubles as timestamp order here.
        Ok(self
            .snapshots
            .lock()
            .expect("snapshot map lock poisoned")
            .get(session_id)
            .and_then(|v| v.last())
            .cloned())
    }

    async fn history(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StateSnapshot>, DomainError> {
        self.check_available()?;
        Ok(self
            .snapshots
            .lock()
            .expect("snapshot map lock poisoned")
            .get(session_id)
            .map(|v| {
                v.iter()
                    .skip(offset as usize)
                    .take(limit as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete_for_session(&self, session_id: &SessionId) -> Result<(), DomainError> {
        self.check_available()?;
        self.snapshots
            .lock()
            .expect("snapshot map lock poisoned")
            .remove(session_id);
        self.write_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::Progress;
    use serde_json::json;

    fn snapshot(id: SessionId, progress: u8) -> StateSnapshot {
        StateSnapshot::new(
            id,
            json!({"progress": progress}),
            Progress::new(i64::from(progress)),
        )
    }

    #[tokio::test]
    async fn latest_returns_most_recent_append() {
        let repo = InMemorySnapshotRepository::new();
        let id = SessionId::new();
        repo.append(&snapshot(id, 10)).await.unwrap();
        repo.append(&snapshot(id, 60)).await.unwrap();

        let latest = repo.latest(&id).await.unwrap().unwrap();
        assert_eq!(latest.progress().value(), 60);
        assert_eq!(repo.write_count(), 2);
    }

    #[tokio::test]
    async fn history_pages_oldest_first() {
        let repo = InMemorySnapshotRepository::new();
        let id = SessionId::new();
        for p in [10u8, 20, 30] {
            repo.append(&snapshot(id, p)).await.unwrap();
        }

        let page = repo.history(&id, 2, 0).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].progress().value(), 10);

        let rest = repo.history(&id, 2, 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].progress().value(), 30);
    }

    #[tokio::test]
    async fn latest_for_unknown_session_is_none() {
        let repo = InMemorySnapshotRepository::new();
        assert!(repo.latest(&SessionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn failing_repo_rejects_reads_and_writes() {
        let repo = InMemorySnapshotRepository::new();
        let id = SessionId::new();
        repo.append(&snapshot(id, 10)).await.unwrap();
        repo.set_failing(true);
        assert!(repo.latest(&id).await.is_err());
        assert!(repo.append(&snapshot(id, 20)).await.is_err());
    }

    #[tokio::test]
    async fn delete_for_session_clears_history() {
        let repo = InMemorySnapshotRepository::new();
        let id = SessionId::new();
        repo.append(&snapshot(id, 10)).await.unwrap();
        repo.delete_for_session(&id).await.unwrap();
        assert_eq!(repo.count_for(&id), 0);
    }
}
