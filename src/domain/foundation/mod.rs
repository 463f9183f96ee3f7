//! Foundation value objects shared across the domain layer.

mod confidence;
mod errors;
mod ids;
mod progress;
mod timestamp;

pub use confidence::Confidence;
pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ClientId, SessionId, UserId};
pub use progress::{FormPhase, Progress};
pub use timestamp::Timestamp;
