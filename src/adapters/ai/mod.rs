//! Generation service adapters.

mod mock_service;

pub use mock_service::MockGenerationService;
