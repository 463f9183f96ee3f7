//! In-memory adapters, exported for embedders and used heavily in tests.

mod chat_log_repository;
mod session_repository;
mod snapshot_repository;

pub use chat_log_repository::InMemoryChatLogRepository;
pub use session_repository::InMemorySessionRepository;
pub use snapshot_repository::InMemorySnapshotRepository;
