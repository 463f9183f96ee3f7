//! Snapshot cache port.

use std::time::Duration;

use crate::domain::foundation::SessionId;
use crate::domain::session::StateSnapshot;

/// Best-effort read cache for the latest snapshot per session.
///
/// The cache is never the source of truth. Implementations are
/// synchronous; lookups must be cheap enough to sit on the hot path.
/// Entries expire after the TTL passed to `set`; an expired entry is
/// indistinguishable from a miss.
pub trait SnapshotCache: Send + Sync {
    /// Returns a live cached snapshot, or None on miss or expiry.
    fn get(&self, session_id: &SessionId) -> Option<StateSnapshot>;

    /// Stores a snapshot with the given time-to-live.
    fn set(&self, session_id: &SessionId, snapshot: StateSnapshot, ttl: Duration);

    /// Drops the entry for one session, if present.
    fn invalidate(&self, session_id: &SessionId);

    /// Drops all entries.
    fn clear(&self);
}
