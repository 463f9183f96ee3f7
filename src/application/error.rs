//! Application-level error type.

use thiserror::Error;

use crate::domain::foundation::DomainError;
use crate::ports::GenerationError;

/// Anything the engine or orchestrator can fail with.
///
/// Generation failures pass through unchanged so embedders can apply
/// their own retry or budget policy.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl EngineError {
    /// Returns the domain error, if that is what this wraps.
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            EngineError::Generation(_) => None,
        }
    }
}
