use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// High-level error categories surfaced by a browser driver.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdapterErrorKind {
    #[error("navigation timed out")]
    NavTimeout,
    #[error("operation timed out")]
    Timeout,
    #[error("element is stale")]
    StaleElement,
    #[error("element is not interactable")]
    NotInteractable,
    #[error("cdp i/o failure")]
    CdpIo,
    #[error("browser context closed")]
    ContextClosed,
    #[error("unknown element handle")]
    UnknownElement,
    #[error("browser launch failed")]
    Launch,
    #[error("internal error")]
    Internal,
}

impl AdapterErrorKind {
    /// Whether errors of this kind may succeed when the same call is repeated.
    pub fn default_retriable(self) -> bool {
        matches!(
            self,
            AdapterErrorKind::NavTimeout
                | AdapterErrorKind::Timeout
                | AdapterErrorKind::StaleElement
                | AdapterErrorKind::NotInteractable
                | AdapterErrorKind::CdpIo
        )
    }
}

/// Enriched error metadata passed back to higher layers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AdapterError {
    pub kind: AdapterErrorKind,
    pub hint: Option<String>,
    pub retriable: bool,
}

impl fmt::Display for AdapterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(hint) = &self.hint {
            write!(f, ": {}", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for AdapterError {}

impl AdapterError {
    pub fn new(kind: AdapterErrorKind) -> Self {
        Self {
            kind,
            hint: None,
            retriable: kind.default_retriable(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn retriable(mut self, flag: bool) -> Self {
        self.retriable = flag;
        self
    }

    pub fn is_transient(&self) -> bool {
        self.retriable
    }

    pub fn timeout(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Timeout).with_hint(hint)
    }

    pub fn stale(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::StaleElement).with_hint(hint)
    }

    pub fn context_closed(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::ContextClosed).with_hint(hint)
    }

    pub fn internal(hint: impl Into<String>) -> Self {
        Self::new(AdapterErrorKind::Internal).with_hint(hint)
    }
}
