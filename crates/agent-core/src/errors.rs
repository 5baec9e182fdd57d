use thiserror::Error;

/// Errors raised by an [`LlmProvider`](crate::LlmProvider) call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// No provider configured, endpoint unreachable, or all keys exhausted.
    #[error("llm unavailable: {0}")]
    Unavailable(String),

    #[error("llm call timed out after {0}ms")]
    Timeout(u64),

    #[error("llm rate limited: {0}")]
    RateLimited(String),

    /// Reply arrived but could not be used.
    #[error("invalid llm response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse(message.into())
    }

    /// Whether a later call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LlmError::Timeout(_) | LlmError::RateLimited(_))
    }
}

/// Errors emitted by the interpreter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InterpretError {
    /// Neither the LLM nor the rule-based extractor found an intent.
    #[error("could not interpret instruction: {0}")]
    Interpretation(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    /// LLM reply parsed but failed validation.
    #[error("llm reply rejected: {0}")]
    Rejected(String),
}

impl InterpretError {
    pub fn interpretation(message: impl Into<String>) -> Self {
        Self::Interpretation(message.into())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }
}
