//! Ports: trait boundaries between the application core and adapters.

mod chat_log_repository;
mod generation_service;
mod session_repository;
mod snapshot_cache;
mod snapshot_repository;

pub use chat_log_repository::ChatLogRepository;
pub use generation_service::{
    GenerationError, GenerationRequest, GenerationService, GenerationSettings, PromptBlock,
    ResponseSchema,
};
pub use session_repository::SessionRepository;
pub use snapshot_cache::SnapshotCache;
pub use snapshot_repository::SnapshotRepository;
