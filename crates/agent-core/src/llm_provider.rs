use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::errors::LlmError;

/// One interpretation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    pub system_prompt: String,
    pub instruction: String,
    /// JSON schema of the expected reply object.
    pub response_schema: serde_json::Value,
}

/// Text completion boundary so multiple vendors can plug into the interpreter.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return the raw reply text. Parsing and validation happen upstream.
    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError>;
}

/// Deterministic provider used for tests and offline development.
///
/// Replies are served in order; once the script runs out the fallback reply
/// (if any) is repeated, otherwise the call fails as unavailable.
#[derive(Debug, Default)]
pub struct MockLlmProvider {
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    fallback: Option<Result<String, LlmError>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_request: Mutex<Option<LlmRequest>>,
}

impl MockLlmProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always reply with `text`.
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            fallback: Some(Ok(text.into())),
            ..Self::default()
        }
    }

    /// Always fail with `err`.
    pub fn failing(err: LlmError) -> Self {
        Self {
            fallback: Some(Err(err)),
            ..Self::default()
        }
    }

    /// Queue a one-shot reply ahead of the fallback.
    pub fn push_reply(&self, reply: Result<String, LlmError>) {
        self.script.lock().push_back(reply);
    }

    /// Sleep before answering, to exercise call timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.last_request.lock().clone()
    }
}

#[async_trait]
impl LlmProvider for MockLlmProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock() = Some(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().pop_front();
        scripted
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| Err(LlmError::unavailable("mock provider has no reply")))
    }
}
