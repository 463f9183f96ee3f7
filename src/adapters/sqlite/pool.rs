//! SQLite pool construction and schema migration.
//!
//! WAL journaling and enforced foreign keys match the access pattern
//! this crate needs: many short reads, append-mostly writes, cascading
//! deletes handled explicitly in the store layer.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

use crate::config::DatabaseConfig;
use crate::domain::foundation::{DomainError, ErrorCode};

fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::new(ErrorCode::DatabaseError, e.to_string())
}

/// Opens (creating if needed) a SQLite database file and runs migrations.
pub async fn connect(path: &Path, max_connections: u32) -> Result<SqlitePool, DomainError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(db_error)?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Opens the database described by a [`DatabaseConfig`] section.
pub async fn connect_from_config(config: &DatabaseConfig) -> Result<SqlitePool, DomainError> {
    connect(Path::new(&config.path), config.max_connections).await
}

/// Opens an in-memory database for tests.
///
/// A single connection keeps the database alive for the pool's
/// lifetime; in-memory SQLite is per-connection.
pub async fn open_in_memory() -> Result<SqlitePool, DomainError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(db_error)?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .map_err(db_error)?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// Creates the schema if it does not exist yet.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id          TEXT PRIMARY KEY,
            user_id     TEXT NOT NULL,
            client_id   TEXT NOT NULL,
            form_schema TEXT NOT NULL,
            active      INTEGER NOT NULL DEFAULT 1,
            created_at  TEXT NOT NULL,
            last_active TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS form_snapshots (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            state_json TEXT NOT NULL,
            progress   INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_form_snapshots_session
         ON form_snapshots (session_id, created_at)",
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_messages (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id TEXT NOT NULL REFERENCES sessions(id),
            role       TEXT NOT NULL,
            content    TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_session
         ON chat_messages (session_id, created_at)",
    )
    .execute(pool)
    .await
    .map_err(db_error)?;

    Ok(())
}
