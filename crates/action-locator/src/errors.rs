//! Error types for locator system

use action_primitives::{ActionError, Artifacts};
use cdp_adapter::{AdapterError, AdapterErrorKind};
use thiserror::Error;

/// Locator error enumeration
#[derive(Debug, Error, Clone)]
pub enum LocatorError {
    /// Every candidate was polled up to its timeout without a match
    #[error("Element not found for role '{role}' after trying {}", tried.join(", "))]
    ElementNotFound {
        role: String,
        tried: Vec<String>,
        artifacts: Artifacts,
    },

    /// Browser context went away while resolving
    #[error("Browser context closed: {0}")]
    ContextClosed(String),

    /// Non-transient driver failure
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Resolution cancelled by the caller
    #[error("Resolution interrupted: {0}")]
    Interrupted(String),

    /// Task deadline passed while resolving
    #[error("Resolution deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// A selector advisor could not produce suggestions
    #[error("Selector advisor failed: {0}")]
    Advisor(String),
}

impl LocatorError {
    /// Locator failures are final for the step that asked
    pub fn is_retryable(&self) -> bool {
        false
    }
}

impl From<AdapterError> for LocatorError {
    fn from(err: AdapterError) -> Self {
        match err.kind {
            AdapterErrorKind::ContextClosed => LocatorError::ContextClosed(err.to_string()),
            _ => LocatorError::CdpError(err.to_string()),
        }
    }
}

impl From<ActionError> for LocatorError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Interrupted(msg) => LocatorError::Interrupted(msg),
            ActionError::DeadlineExceeded(msg) => LocatorError::DeadlineExceeded(msg),
            ActionError::ContextClosed(msg) => LocatorError::ContextClosed(msg),
            other => LocatorError::CdpError(other.to_string()),
        }
    }
}

impl From<LocatorError> for ActionError {
    fn from(err: LocatorError) -> Self {
        match err {
            LocatorError::ElementNotFound {
                role,
                tried,
                artifacts,
            } => ActionError::ElementNotFound {
                role,
                tried,
                artifacts,
            },
            LocatorError::ContextClosed(msg) => ActionError::ContextClosed(msg),
            LocatorError::CdpError(msg) | LocatorError::Advisor(msg) => ActionError::Internal(msg),
            LocatorError::Interrupted(msg) => ActionError::Interrupted(msg),
            LocatorError::DeadlineExceeded(msg) => ActionError::DeadlineExceeded(msg),
        }
    }
}
