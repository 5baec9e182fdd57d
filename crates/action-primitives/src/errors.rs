//! Error types for action primitives

use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

use crate::artifacts::Artifacts;

/// Comprehensive error types for action primitive operations
#[derive(Debug, Error, Clone)]
pub enum ActionError {
    /// Query built with no usable selector
    #[error("Invalid element query: {0}")]
    InvalidQuery(String),

    /// Step is missing its target or payload
    #[error("Invalid step: {0}")]
    InvalidStep(String),

    /// Navigation timed out waiting for page load
    #[error("Navigation timeout: {0}")]
    NavTimeout(String),

    /// Wait operation timed out
    #[error("Wait timeout: {0}")]
    WaitTimeout(String),

    /// Element detached between lookup and interaction
    #[error("Stale element: {0}")]
    StaleElement(String),

    /// Element is not clickable (obscured, disabled, or not interactable)
    #[error("Element not clickable: {0}")]
    NotClickable(String),

    /// CDP communication or protocol error
    #[error("CDP I/O error: {0}")]
    CdpIo(String),

    /// Browser context was closed under the step
    #[error("Browser context closed: {0}")]
    ContextClosed(String),

    /// Every candidate selector for a role was tried without a match
    #[error("Element not found for role '{role}' after trying {}", tried.join(", "))]
    ElementNotFound {
        role: String,
        tried: Vec<String>,
        artifacts: Artifacts,
    },

    /// Service rejected the supplied credentials
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Operation was cancelled or interrupted
    #[error("Operation interrupted: {0}")]
    Interrupted(String),

    /// Task deadline passed before the operation completed
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Retryable failure that kept failing
    #[error("Retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<ActionError> },

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ActionError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ActionError::NavTimeout(_)
                | ActionError::WaitTimeout(_)
                | ActionError::StaleElement(_)
                | ActionError::NotClickable(_)
                | ActionError::CdpIo(_)
        )
    }

    /// Artifacts captured when the error was raised, if any.
    pub fn artifacts(&self) -> Option<&Artifacts> {
        match self {
            ActionError::ElementNotFound { artifacts, .. } if !artifacts.is_empty() => {
                Some(artifacts)
            }
            ActionError::RetriesExhausted { last, .. } => last.artifacts(),
            _ => None,
        }
    }
}

impl From<AdapterError> for ActionError {
    fn from(err: AdapterError) -> Self {
        let message = err.to_string();
        match err.kind {
            AdapterErrorKind::NavTimeout => ActionError::NavTimeout(message),
            AdapterErrorKind::Timeout => ActionError::WaitTimeout(message),
            AdapterErrorKind::StaleElement | AdapterErrorKind::UnknownElement => {
                ActionError::StaleElement(message)
            }
            AdapterErrorKind::NotInteractable => ActionError::NotClickable(message),
            AdapterErrorKind::CdpIo => ActionError::CdpIo(message),
            AdapterErrorKind::ContextClosed => ActionError::ContextClosed(message),
            AdapterErrorKind::Launch | AdapterErrorKind::Internal => {
                ActionError::Internal(message)
            }
        }
    }
}
