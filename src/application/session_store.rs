//! Session store: binding, snapshot persistence, and the cache tiers.
//!
//! # Design
//!
//! The store holds at most one bound session at a time. Reads go
//! through two cache tiers (an instance-local one and a process-wide
//! one) before touching the repositories; writes go to the
//! repositories first and only then refresh both tiers, so the cache
//! can never hold state the database has not accepted.
//!
//! # Invariants
//!
//! - Snapshots are append-only; `save_snapshot` never overwrites.
//! - Cache entries are best-effort. Every cached value was read from
//!   or written to the repositories first.
//! - `delete_session` removes child rows before the session row.

use std::sync::Arc;
use std::time::Duration;

use crate::adapters::cache::TtlCache;
use crate::domain::foundation::{
    ClientId, DomainError, ErrorCode, Progress, SessionId, UserId,
};
use crate::domain::session::{ChatMessage, MessageRole, Session, StateSnapshot};
use crate::ports::{ChatLogRepository, SessionRepository, SnapshotCache, SnapshotRepository};

/// Fixed lifetime for cached latest-snapshot entries.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

const HISTORY_PAGE_SIZE: u32 = 100;

pub struct SessionStore {
    sessions: Arc<dyn SessionRepository>,
    snapshots: Arc<dyn SnapshotRepository>,
    chat_log: Arc<dyn ChatLogRepository>,
    local_cache: Arc<dyn SnapshotCache>,
    shared_cache: Arc<dyn SnapshotCache>,
    ttl: Duration,
    bound: Option<Session>,
}

impl SessionStore {
    /// Creates a store with the default cache tiers: a fresh local
    /// cache plus the process-wide shared one.
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        chat_log: Arc<dyn ChatLogRepository>,
    ) -> Self {
        Self::with_caches(
            sessions,
            snapshots,
            chat_log,
            Arc::new(TtlCache::new()),
            TtlCache::process_shared(),
        )
    }

    /// Creates a store with explicit cache tiers.
    pub fn with_caches(
        sessions: Arc<dyn SessionRepository>,
        snapshots: Arc<dyn SnapshotRepository>,
        chat_log: Arc<dyn ChatLogRepository>,
        local_cache: Arc<dyn SnapshotCache>,
        shared_cache: Arc<dyn SnapshotCache>,
    ) -> Self {
        Self {
            sessions,
            snapshots,
            chat_log,
            local_cache,
            shared_cache,
            ttl: DEFAULT_CACHE_TTL,
            bound: None,
        }
    }

    /// Creates a new session and binds the store to it.
    pub async fn create_session(
        &mut self,
        user_id: UserId,
        client_id: ClientId,
        form_schema: &str,
    ) -> Result<SessionId, DomainError> {
        let session = Session::new(user_id, client_id, form_schema)?;
        self.sessions.save(&session).await?;
        let id = *session.id();
        self.bound = Some(session);
        Ok(id)
    }

    /// Binds an existing session, or falls back to the one already
    /// bound, or creates a fresh one when the store is unbound.
    ///
    /// An explicit id that does not exist is an error, never silently
    /// replaced with a fresh session.
    pub async fn get_or_create_session(
        &mut self,
        id: Option<SessionId>,
        user_id: UserId,
        client_id: ClientId,
        form_schema: &str,
    ) -> Result<SessionId, DomainError> {
        match id {
            Some(id) => {
                self.bind_session(id).await?;
                Ok(id)
            }
            None => match self.bound_session_id() {
                Some(bound) => Ok(bound),
                None => self.create_session(user_id, client_id, form_schema).await,
            },
        }
    }

    /// Binds the store to an existing session.
    pub async fn bind_session(&mut self, id: SessionId) -> Result<(), DomainError> {
        let session = self
            .sessions
            .find_by_id(&id)
            .await?
            .ok_or_else(|| DomainError::session_not_found(id))?;
        self.bound = Some(session);
        Ok(())
    }

    /// Id of the currently bound session, if any.
    pub fn bound_session_id(&self) -> Option<SessionId> {
        self.bound.as_ref().map(|s| *s.id())
    }

    /// Whether a session with this id exists in the repository.
    pub async fn session_exists(&self, id: &SessionId) -> Result<bool, DomainError> {
        Ok(self.sessions.find_by_id(id).await?.is_some())
    }

    fn bound_session(&self) -> Result<&Session, DomainError> {
        self.bound.as_ref().ok_or_else(|| {
            DomainError::new(ErrorCode::NoSessionBound, "No session is bound to this store")
        })
    }

    /// Appends a snapshot for the bound session and refreshes both
    /// cache tiers. The session's activity timestamp advances too.
    pub async fn save_snapshot(
        &mut self,
        state: serde_json::Value,
        progress: Progress,
    ) -> Result<StateSnapshot, DomainError> {
        let session_id = *self.bound_session()?.id();
        let snapshot = StateSnapshot::new(session_id, state, progress);
        self.snapshots.append(&snapshot).await?;

        if let Some(session) = self.bound.as_mut() {
            session.touch();
            self.sessions.save(session).await?;
        }

        self.local_cache.set(&session_id, snapshot.clone(), self.ttl);
        self.shared_cache.set(&session_id, snapshot.clone(), self.ttl);
        Ok(snapshot)
    }

    /// Returns the latest snapshot for the bound session.
    ///
    /// With `use_cache` the local tier is consulted first, then the
    /// shared tier (repopulating the local one on a hit), then the
    /// repository. Repository reads refresh both tiers.
    pub async fn get_latest_snapshot(
        &self,
        use_cache: bool,
    ) -> Result<Option<StateSnapshot>, DomainError> {
        let session_id = *self.bound_session()?.id();

        if use_cache {
            if let Some(snapshot) = self.local_cache.get(&session_id) {
                return Ok(Some(snapshot));
            }
            if let Some(snapshot) = self.shared_cache.get(&session_id) {
                self.local_cache.set(&session_id, snapshot.clone(), self.ttl);
                return Ok(Some(snapshot));
            }
        }

        let snapshot = self.snapshots.latest(&session_id).await?;
        if let Some(snapshot) = &snapshot {
            self.local_cache.set(&session_id, snapshot.clone(), self.ttl);
            self.shared_cache.set(&session_id, snapshot.clone(), self.ttl);
        }
        Ok(snapshot)
    }

    /// Snapshot history for the bound session, oldest first, bounded
    /// by `limit` when one is given.
    ///
    /// Reads in fixed-size batches; corrupt rows are skipped by the
    /// repository with a warning.
    pub async fn get_snapshot_history(
        &self,
        limit: Option<u32>,
    ) -> Result<Vec<StateSnapshot>, DomainError> {
        let session_id = *self.bound_session()?.id();
        let mut all = Vec::new();
        let mut offset = 0u32;
        loop {
            let remaining = match limit {
                Some(limit) => {
                    let left = limit.saturating_sub(all.len() as u32);
                    if left == 0 {
                        break;
                    }
                    left.min(HISTORY_PAGE_SIZE)
                }
                None => HISTORY_PAGE_SIZE,
            };
            let page = self.snapshots.history(&session_id, remaining, offset).await?;
            let page_len = page.len() as u32;
            all.extend(page);
            if page_len < remaining {
                break;
            }
            offset += page_len;
        }
        Ok(all)
    }

    /// Rebinds to another session for the guard's lifetime. The prior
    /// binding comes back when the guard drops, even during a panic.
    pub async fn temporary_session(
        &mut self,
        target: SessionId,
    ) -> Result<SessionBindingGuard<'_>, DomainError> {
        let prior = self.bound.take();
        match self.bind_session(target).await {
            Ok(()) => Ok(SessionBindingGuard { store: self, prior }),
            Err(e) => {
                self.bound = prior;
                Err(e)
            }
        }
    }

    /// Drops cached snapshots from both tiers: one session's entry
    /// when an id is given, everything otherwise.
    pub fn clear_cache(&self, session_id: Option<SessionId>) {
        match session_id {
            Some(id) => {
                self.local_cache.invalidate(&id);
                self.shared_cache.invalidate(&id);
            }
            None => {
                self.local_cache.clear();
                self.shared_cache.clear();
            }
        }
    }

    /// Marks the bound session closed and unbinds. Data is kept.
    pub async fn close_session(&mut self) -> Result<(), DomainError> {
        let session_id = *self.bound_session()?.id();
        if let Some(session) = self.bound.as_mut() {
            session.close();
            self.sessions.save(session).await?;
        }
        self.clear_cache(Some(session_id));
        self.bound = None;
        Ok(())
    }

    /// Deletes the bound session and everything belonging to it, then
    /// unbinds. Children go first so foreign keys hold throughout.
    pub async fn delete_session(&mut self) -> Result<(), DomainError> {
        let session_id = *self.bound_session()?.id();
        self.chat_log.delete_for_session(&session_id).await?;
        self.snapshots.delete_for_session(&session_id).await?;
        self.sessions.delete(&session_id).await?;
        self.clear_cache(Some(session_id));
        self.bound = None;
        tracing::debug!(session_id = %session_id, "session deleted");
        Ok(())
    }

    /// Appends a message to the bound session's audit log.
    pub async fn log_message(
        &self,
        role: MessageRole,
        content: &str,
    ) -> Result<(), DomainError> {
        let session_id = *self.bound_session()?.id();
        let message = ChatMessage::new(session_id, role, content);
        self.chat_log.append(&message).await
    }

    /// Most recent audit log messages for the bound session, oldest
    /// first.
    pub async fn get_messages(&self, limit: u32) -> Result<Vec<ChatMessage>, DomainError> {
        let session_id = *self.bound_session()?.id();
        self.chat_log.recent(&session_id, limit).await
    }

    pub(crate) fn take_binding(&mut self) -> Option<Session> {
        self.bound.take()
    }

    pub(crate) fn restore_binding(&mut self, binding: Option<Session>) {
        self.bound = binding;
    }
}

/// RAII guard holding a temporary session binding.
pub struct SessionBindingGuard<'a> {
    store: &'a mut SessionStore,
    prior: Option<Session>,
}

impl std::ops::Deref for SessionBindingGuard<'_> {
    type Target = SessionStore;

    fn deref(&self) -> &SessionStore {
        self.store
    }
}

impl std::ops::DerefMut for SessionBindingGuard<'_> {
    fn deref_mut(&mut self) -> &mut SessionStore {
        self.store
    }
}

impl Drop for SessionBindingGuard<'_> {
    fn drop(&mut self) {
        self.store.bound = self.prior.take();
    }
}
