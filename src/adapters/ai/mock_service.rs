//! Scripted generation service for tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ports::{GenerationError, GenerationRequest, GenerationService};

/// Returns queued responses in order, recording every request.
///
/// When the queue is exhausted it answers with an empty JSON object,
/// which deserializes to a default form state.
#[derive(Default)]
pub struct MockGenerationService {
    responses: Mutex<VecDeque<Result<serde_json::Value, GenerationError>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    call_count: AtomicUsize,
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful response.
    pub fn push_response(&self, value: serde_json::Value) {
        self.responses
            .lock()
            .expect("mock responses lock poisoned")
            .push_back(Ok(value));
    }

    /// Queues a failure.
    pub fn push_error(&self, error: GenerationError) {
        self.responses
            .lock()
            .expect("mock responses lock poisoned")
            .push_back(Err(error));
    }

    /// Number of generate calls made so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Copies of every request seen, in call order.
    pub fn recorded_requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .expect("mock requests lock poisoned")
            .clone()
    }

    /// The most recent request, if any call was made.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests
            .lock()
            .expect("mock requests lock poisoned")
            .last()
            .cloned()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<serde_json::Value, GenerationError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("mock requests lock poisoned")
            .push(request.clone());

        self.responses
            .lock()
            .expect("mock responses lock poisoned")
            .pop_front()
            .unwrap_or(Ok(serde_json::json!({})))
    }
}
