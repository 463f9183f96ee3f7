//! SQLite snapshot repository.
//!
//! # Invariants
//!
//! - Rows are append-only; there is no UPDATE path.
//! - `latest` orders by timestamp with the row id as tiebreaker, so
//!   two snapshots in the same instant resolve to the later insert.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::foundation::{DomainError, ErrorCode, Progress, SessionId, Timestamp};
use crate::domain::session::StateSnapshot;
use crate::ports::SnapshotRepository;

pub struct SqliteSnapshotRepository {
    pool: SqlitePool,
}

impl SqliteSnapshotRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_error(e: sqlx::Error) -> DomainError {
        DomainError::new(ErrorCode::DatabaseError, e.to_string())
    }

    fn row_to_snapshot(row: &sqlx::sqlite::SqliteRow) -> Result<StateSnapshot, DomainError> {
        let session_id: String = row.try_get("session_id").map_err(Self::db_error)?;
        let state_json: String = row.try_get("state_json").map_err(Self::db_error)?;
        let progress: i64 = row.try_get("progress").map_err(Self::db_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(Self::db_error)?;

        let session_id: SessionId = session_id.parse().map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid session id in snapshot row: {}", e),
            )
        })?;

        let state: serde_json::Value = serde_json::from_str(&state_json).map_err(|e| {
            DomainError::new(
                ErrorCode::SnapshotCorrupted,
                format!("Snapshot state is not valid JSON: {}", e),
            )
            .with_detail("session_id", session_id.to_string())
        })?;

        Ok(StateSnapshot::reconstitute(
            session_id,
            state,
            Progress::new(progress),
            Timestamp::from_datetime(created_at),
        ))
    }
}

#[async_trait]
impl SnapshotRepository for SqliteSnapshotRepository {
    async fn append(&self, snapshot: &StateSnapshot) -> Result<(), DomainError> {
        let state_json = serde_json::to_string(snapshot.state()).map_err(|e| {
            DomainError::new(
                ErrorCode::SerializationFailed,
                format!("Failed to serialize snapshot state: {}", e),
            )
        })?;

        sqlx::query(
            "INSERT INTO form_snapshots (session_id, state_json, progress, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(snapshot.session_id().to_string())
        .bind(state_json)
        .bind(i64::from(snapshot.progress().value()))
        .bind(*snapshot.created_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;
        Ok(())
    }

    async fn latest(&self, session_id: &SessionId) -> Result<Option<StateSnapshot>, DomainError> {
        let row = sqlx::query(
            "SELECT session_id, state_json, progress, created_at
             FROM form_snapshots
             WHERE session_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(session_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::db_error)?;

        row.as_ref().map(Self::row_to_snapshot).transpose()
    }

    async fn history(
        &self,
        session_id: &SessionId,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<StateSnapshot>, DomainError> {
        let rows = sqlx::query(
            "SELECT session_id, state_json, progress, created_at
             FROM form_snapshots
             WHERE session_id = ?
             ORDER BY created_at ASC, id ASC
             LIMIT ? OFFSET ?",
        )
        .bind(session_id.to_string())
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_error)?;

        let mut snapshots = Vec::with_capacity(rows.len());
        for row in &rows {
            match Self::row_to_snapshot(row) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(e) if e.code == ErrorCode::SnapshotCorrupted => {
                    tracing::warn!(session_id = %session_id, error = %e, "skipping corrupt snapshot row");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(snapshots)
    }

    async fn delete_for_session(&self, session_id: &SessionId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM form_snapshots WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::pool::open_in_memory;
    use crate::adapters::sqlite::SqliteSessionRepository;
    use crate::domain::foundation::{ClientId, UserId};
    use crate::domain::session::Session;
    use crate::ports::SessionRepository;
    use serde_json::json;

    async fn setup() -> (SqlitePool, SessionId) {
        let pool = open_in_memory().await.unwrap();
        let sessions = SqliteSessionRepository::new(pool.clone());
        let session = Session::new(
            UserId::new("user-1").unwrap(),
            ClientId::new("client").unwrap(),
            "StartupForm",
        )
        .unwrap();
        sessions.save(&session).await.unwrap();
        (pool, *session.id())
    }

    fn snapshot(id: SessionId, progress: u8) -> StateSnapshot {
        StateSnapshot::new(
            id,
            json!({"progress": progress, "form": {}}),
            Progress::new(i64::from(progress)),
        )
    }

    #[tokio::test]
    async fn append_and_latest_round_trip() {
        let (pool, id) = setup().await;
        let repo = SqliteSnapshotRepository::new(pool);

        repo.append(&snapshot(id, 10)).await.unwrap();
        repo.append(&snapshot(id, 55)).await.unwrap();

        let latest = repo.latest(&id).await.unwrap().unwrap();
        assert_eq!(latest.progress().value(), 55);
        assert_eq!(latest.state()["progress"], 55);
    }

    #[tokio::test]
    async fn same_instant_ties_resolve_to_later_insert() {
        let (pool, id) = setup().await;
        let repo = SqliteSnapshotRepository::new(pool);

        let ts = Timestamp::now();
        let first =
            StateSnapshot::reconstitute(id, json!({"progress": 10}), Progress::new(10), ts);
        let second =
            StateSnapshot::reconstitute(id, json!({"progress": 20}), Progress::new(20), ts);
        repo.append(&first).await.unwrap();
        repo.append(&second).await.unwrap();

        let latest = repo.latest(&id).await.unwrap().unwrap();
        assert_eq!(latest.progress().value(), 20);
    }

    #[tokio::test]
    async fn history_pages_oldest_first() {
        let (pool, id) = setup().await;
        let repo = SqliteSnapshotRepository::new(pool);

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
    async fn corrupt_row_fails_latest_but_is_skipped_in_history() {
        let (pool, id) = setup().await;
        let repo = SqliteSnapshotRepository::new(pool.clone());

        repo.append(&snapshot(id, 10)).await.unwrap();
        sqlx::query(
            "INSERT INTO form_snapshots (session_id, state_json, progress, created_at)
             VALUES (?, 'not json', 0, ?)",
        )
        .bind(id.to_string())
        .bind(*Timestamp::now().as_datetime())
        .execute(&pool)
        .await
        .unwrap();

        let err = repo.latest(&id).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::SnapshotCorrupted);

        let history = repo.history(&id, 100, 0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].progress().value(), 10);
    }
}
