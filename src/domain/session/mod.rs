//! Session aggregate and its persisted artifacts.

mod chat_message;
mod session;
mod snapshot;

pub use chat_message::{ChatMessage, MessageRole};
pub use session::Session;
pub use snapshot::StateSnapshot;
