//! SQLite session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::foundation::{
    ClientId, DomainError, ErrorCode, SessionId, Timestamp, UserId,
};
use crate::domain::session::Session;
use crate::ports::SessionRepository;

pub struct SqliteSessionRepository {
    pool: SqlitePool,
}

impl SqliteSessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_error(e: sqlx::Error) -> DomainError {
        DomainError::new(ErrorCode::DatabaseError, e.to_string())
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, DomainError> {
        let id: String = row.try_get("id").map_err(Self::db_error)?;
        let user_id: String = row.try_get("user_id").map_err(Self::db_error)?;
        let client_id: String = row.try_get("client_id").map_err(Self::db_error)?;
        let form_schema: String = row.try_get("form_schema").map_err(Self::db_error)?;
        let active: i64 = row.try_get("active").map_err(Self::db_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(Self::db_error)?;
        let last_active: DateTime<Utc> = row.try_get("last_active").map_err(Self::db_error)?;

        let session_id: SessionId = id.parse().map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid session id in row: {}", e),
            )
        })?;
        let user_id = UserId::new(user_id).map_err(DomainError::from)?;
        let client_id = ClientId::new(client_id).map_err(DomainError::from)?;

        Ok(Session::reconstitute(
            session_id,
            user_id,
            client_id,
            form_schema,
            active != 0,
            Timestamp::from_datetime(created_at),
            Timestamp::from_datetime(last_active),
        ))
    }
}

#[async_trait]
impl SessionRepository for SqliteSessionRepository {
    async fn save(&self, session: &Session) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, client_id, form_schema, active, created_at, last_active)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (id) DO UPDATE SET
                active = excluded.active,
                last_active = excluded.last_active
            "#,
        )
        .bind(session.id().to_string())
        .bind(session.user_id().as_str())
        .bind(session.client_id().as_str())
        .bind(session.form_schema())
        .bind(i64::from(session.is_active()))
        .bind(*session.created_at().as_datetime())
        .bind(*session.last_active().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, DomainError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_error)?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn delete(&self, id: &SessionId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_error)?;
        Ok(())
    }
}
