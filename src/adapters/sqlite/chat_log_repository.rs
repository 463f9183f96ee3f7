//! SQLite chat message log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::foundation::{DomainError, ErrorCode, SessionId, Timestamp};
use crate::domain::session::{ChatMessage, MessageRole};
use crate::ports::ChatLogRepository;

pub struct SqliteChatLogRepository {
    pool: SqlitePool,
}

impl SqliteChatLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn db_error(e: sqlx::Error) -> DomainError {
        DomainError::new(ErrorCode::DatabaseError, e.to_string())
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<ChatMessage, DomainError> {
        let session_id: String = row.try_get("session_id").map_err(Self::db_error)?;
        let role: String = row.try_get("role").map_err(Self::db_error)?;
        let content: String = row.try_get("content").map_err(Self::db_error)?;
        let created_at: DateTime<Utc> = row.try_get("created_at").map_err(Self::db_error)?;

        let session_id: SessionId = session_id.parse().map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Invalid session id in message row: {}", e),
            )
        })?;
        let role: MessageRole = role
            .parse()
            .map_err(|e: String| DomainError::new(ErrorCode::DatabaseError, e))?;

        Ok(ChatMessage::reconstitute(
            session_id,
            role,
            content,
            Timestamp::from_datetime(created_at),
        ))
    }
}

#[async_trait]
impl ChatLogRepository for SqliteChatLogRepository {
    async fn append(&self, message: &ChatMessage) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO chat_messages (session_id, role, content, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(message.session_id().to_string())
        .bind(message.role().to_string())
        .bind(message.content())
        .bind(*message.created_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(Self::db_error)?;
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &SessionId,
        limit: u32,
    ) -> Result<Vec<ChatMessage>, DomainError> {
        let rows = sqlx::query(
            "SELECT session_id, role, content, created_at
             FROM chat_messages
             WHERE session_id = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(session_id.to_string())
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_error)?;

        let mut messages = rows
            .iter()
            .map(Self::row_to_message)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn delete_for_session(&self, session_id: &SessionId) -> Result<(), DomainError> {
        sqlx::query("DELETE FROM chat_messages WHERE session_id = ?")
            .bind(session_id.to_string())
            .execute(&self.pool)
            .await
            .map_err(Self::db_error)?;
        Ok(())
    }
}
