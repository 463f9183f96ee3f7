//! SQLite persistence adapters.

mod chat_log_repository;
pub mod pool;
mod session_repository;
mod snapshot_repository;

pub use chat_log_repository::SqliteChatLogRepository;
pub use session_repository::SqliteSessionRepository;
pub use snapshot_repository::SqliteSnapshotRepository;
