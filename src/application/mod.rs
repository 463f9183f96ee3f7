//! Application layer: the store, the engine, and the orchestrator.

mod engine;
mod error;
mod orchestrator;
mod session_store;

pub use engine::{EngineOptions, ProgressFormEngine, TemporarySession};
pub use error::EngineError;
pub use orchestrator::{
    FormOrchestrator, ToolDescriptor, ToolHandler, ToolOutcome, ToolRegistry, UPDATE_FORM_TOOL,
};
pub use session_store::{SessionBindingGuard, SessionStore, DEFAULT_CACHE_TTL};
