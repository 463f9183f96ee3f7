//! Snapshot persistence port.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, SessionId};
use crate::domain::session::StateSnapshot;

/// Append-only persistence for form state snapshots.
///
/// Snapshots are immutable once written. `latest` returns the snapshot
/// with the greatest timestamp; on a tie the most recently inserted row
/// wins.
#[async_trait]
pub trait SnapshotRepository: Send + Sync {
    /// Appends a snapshot. Never updates existing rows.
    async fn append(&self, snapshot: &StateSnapshot) -> Result<(), DomainError>;

    /// Returns the most recent snapshot for a session, if any.
    ///
    /// A row whose state document cannot be parsed yields
    /// `ErrorCode::SnapshotCorrupted`.
    async fn latest(&self, session_id: &SessionId) -> Result<Option<StateSnapshot>, DomainError>;

    /// Returns one batch of snapshot history, oldest first.
    ///
    /// Corrupt rows are skipped with a warning rather than failing the
    /// whole read.
    async fn history(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StateSnapshot>, DomainError>;

    /// Deletes all snapshots belonging to a session.
    async fn delete_for_session(&self, session_id: &SessionId) -> Result<(), DomainError>;
}
