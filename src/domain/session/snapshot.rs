//! Immutable, append-only snapshots of form state.
//!
//! Snapshots are never updated in place. The latest snapshot for a
//! session is the one with the greatest timestamp; earlier rows form
//! the session's history.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Progress, SessionId, Timestamp};

/// One persisted point-in-time capture of a session's form state.
///
/// The state document is kept as raw JSON here; the engine layer
/// interprets it against a concrete form type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    session_id: SessionId,
    state: serde_json::Value,
    progress: Progress,
    created_at: Timestamp,
}

impl StateSnapshot {
    /// Captures a new snapshot at the current instant.
    pub fn new(session_id: SessionId, state: serde_json::Value, progress: Progress) -> Self {
        Self {
            session_id,
            state,
            progress,
            created_at: Timestamp::now(),
        }
    }

    /// Reconstitutes a snapshot from persisted state.
    pub fn reconstitute(
        session_id: SessionId,
        state: serde_json::Value,
        progress: Progress,
        created_at: Timestamp,
    ) -> Self {
        Self {
            session_id,
            state,
            progress,
            created_at,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    pub fn state(&self) -> &serde_json::Value {
        &self.state
    }

    /// Consumes the snapshot, yielding the state document.
    pub fn into_state(self) -> serde_json::Value {
        self.state
    }

    pub fn progress(&self) -> Progress {
        self.progress
    }

    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn snapshot_captures_state_and_progress() {
        let id = SessionId::new();
        let snapshot = StateSnapshot::new(id, json!({"progress": 40}), Progress::new(40));
        assert_eq!(snapshot.session_id(), &id);
        assert_eq!(snapshot.progress().value(), 40);
        assert_eq!(snapshot.state()["progress"], 40);
    }

    #[test]
    fn snapshot_round_trips_through_json() {
        let snapshot = StateSnapshot::new(
            SessionId::new(),
            json!({"form": {"idea": "an app"}, "progress": 25}),
            Progress::new(25),
        );
        let serialized = serde_json::to_string(&snapshot).unwrap();
        let restored: StateSnapshot = serde_json::from_str(&serialized).unwrap();
        assert_eq!(snapshot, restored);
    }
}
