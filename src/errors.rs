//! Engine error taxonomy
//!
//! Lower crates keep their own narrow enums; everything that crosses the
//! orchestrator boundary is folded into [`EngineError`], and its
//! [`ErrorKind`] is what ends up in an `ExecutionResult`.

use std::fmt;

use action_locator::LocatorError;
use action_primitives::{ActionError, Artifacts};
use agent_core::InterpretError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Interpretation failed: {0}")]
    Interpretation(String),

    #[error("No provider available: {0}")]
    NoProviderAvailable(String),

    #[error("Authentication with {provider} failed: {reason}")]
    Authentication {
        provider: String,
        reason: String,
        artifacts: Artifacts,
    },

    #[error("Element not found for role '{role}' after trying {}", tried.join(", "))]
    ElementNotFound {
        role: String,
        tried: Vec<String>,
        artifacts: Artifacts,
    },

    /// Retryable failure that escaped without going through the retry loop.
    #[error("Transient action failure: {0}")]
    TransientAction(String),

    #[error("Action failed: {0}")]
    FatalAction(String),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Serializable class of an [`EngineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Interpretation,
    NoProviderAvailable,
    Authentication,
    ElementNotFound,
    TransientAction,
    FatalAction,
    Session,
    Cancelled,
    DeadlineExceeded,
    Config,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Interpretation => "interpretation",
            ErrorKind::NoProviderAvailable => "no_provider_available",
            ErrorKind::Authentication => "authentication",
            ErrorKind::ElementNotFound => "element_not_found",
            ErrorKind::TransientAction => "transient_action",
            ErrorKind::FatalAction => "fatal_action",
            ErrorKind::Session => "session",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::DeadlineExceeded => "deadline_exceeded",
            ErrorKind::Config => "config",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn interpretation(message: impl Into<String>) -> Self {
        EngineError::Interpretation(message.into())
    }

    pub fn no_provider(message: impl Into<String>) -> Self {
        EngineError::NoProviderAvailable(message.into())
    }

    pub fn authentication(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Authentication {
            provider: provider.into(),
            reason: reason.into(),
            artifacts: Artifacts::default(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        EngineError::Session(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        EngineError::Config(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Interpretation(_) => ErrorKind::Interpretation,
            EngineError::NoProviderAvailable(_) => ErrorKind::NoProviderAvailable,
            EngineError::Authentication { .. } => ErrorKind::Authentication,
            EngineError::ElementNotFound { .. } => ErrorKind::ElementNotFound,
            EngineError::TransientAction(_) => ErrorKind::TransientAction,
            EngineError::FatalAction(_) => ErrorKind::FatalAction,
            EngineError::Session(_) => ErrorKind::Session,
            EngineError::Cancelled(_) => ErrorKind::Cancelled,
            EngineError::DeadlineExceeded(_) => ErrorKind::DeadlineExceeded,
            EngineError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::TransientAction(_))
    }

    /// Artifacts captured where the error was raised, if any.
    pub fn artifacts(&self) -> Option<&Artifacts> {
        match self {
            EngineError::Authentication { artifacts, .. }
            | EngineError::ElementNotFound { artifacts, .. }
                if !artifacts.is_empty() =>
            {
                Some(artifacts)
            }
            _ => None,
        }
    }

    /// Wrap an action failure raised while signing in to `provider`.
    ///
    /// Cancellation, deadline and session loss keep their own class.
    pub fn from_auth_failure(provider: &str, err: ActionError) -> Self {
        match EngineError::from(err) {
            err @ (EngineError::Cancelled(_)
            | EngineError::DeadlineExceeded(_)
            | EngineError::Session(_)) => err,
            EngineError::Authentication { reason, artifacts, .. } => EngineError::Authentication {
                provider: provider.to_string(),
                reason,
                artifacts,
            },
            other => {
                let artifacts = other.artifacts().cloned().unwrap_or_default();
                EngineError::Authentication {
                    provider: provider.to_string(),
                    reason: other.to_string(),
                    artifacts,
                }
            }
        }
    }
}

impl From<ActionError> for EngineError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::ElementNotFound {
                role,
                tried,
                artifacts,
            } => EngineError::ElementNotFound {
                role,
                tried,
                artifacts,
            },
            ActionError::InvalidCredentials(reason) => EngineError::Authentication {
                provider: "unknown".to_string(),
                reason,
                artifacts: Artifacts::default(),
            },
            ActionError::Interrupted(msg) => EngineError::Cancelled(msg),
            ActionError::DeadlineExceeded(msg) => EngineError::DeadlineExceeded(msg),
            ActionError::ContextClosed(msg) => EngineError::Session(msg),
            err @ ActionError::RetriesExhausted { .. } => EngineError::FatalAction(err.to_string()),
            err if err.is_retryable() => EngineError::TransientAction(err.to_string()),
            other => EngineError::FatalAction(other.to_string()),
        }
    }
}

impl From<LocatorError> for EngineError {
    fn from(err: LocatorError) -> Self {
        EngineError::from(ActionError::from(err))
    }
}

impl From<InterpretError> for EngineError {
    fn from(err: InterpretError) -> Self {
        EngineError::Interpretation(err.to_string())
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn artifacts() -> Artifacts {
        Artifacts {
            screenshot: Some(PathBuf::from("shot.png")),
            dom_snapshot: Some(PathBuf::from("dom.html")),
        }
    }

    #[test]
    fn action_errors_map_to_engine_classes() {
        let not_found: EngineError = ActionError::ElementNotFound {
            role: "submit-button".into(),
            tried: vec!["#send".into()],
            artifacts: artifacts(),
        }
        .into();
        assert_eq!(not_found.kind(), ErrorKind::ElementNotFound);
        assert_eq!(not_found.artifacts(), Some(&artifacts()));

        let exhausted: EngineError = ActionError::RetriesExhausted {
            attempts: 3,
            last: Box::new(ActionError::StaleElement("#to".into())),
        }
        .into();
        assert_eq!(exhausted.kind(), ErrorKind::FatalAction);
        assert!(!exhausted.is_retryable());

        let transient: EngineError = ActionError::WaitTimeout("x".into()).into();
        assert!(transient.is_retryable());

        let closed: EngineError = ActionError::ContextClosed("ctx".into()).into();
        assert_eq!(closed.kind(), ErrorKind::Session);
        let cancelled: EngineError = ActionError::Interrupted("stop".into()).into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);
    }

    #[test]
    fn auth_failures_keep_cancellation_and_artifacts() {
        let err = EngineError::from_auth_failure(
            "gmail",
            ActionError::ElementNotFound {
                role: "password-field".into(),
                tried: vec![],
                artifacts: artifacts(),
            },
        );
        match &err {
            EngineError::Authentication { provider, artifacts: a, .. } => {
                assert_eq!(provider, "gmail");
                assert_eq!(a, &artifacts());
            }
            other => panic!("unexpected {other:?}"),
        }

        let cancelled =
            EngineError::from_auth_failure("gmail", ActionError::Interrupted("stop".into()));
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);

        let rejected = EngineError::from_auth_failure(
            "outlook",
            ActionError::InvalidCredentials("bad password".into()),
        );
        assert!(rejected.to_string().contains("outlook"));
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoProviderAvailable).unwrap();
        assert_eq!(json, "\"no_provider_available\"");
        assert_eq!(ErrorKind::DeadlineExceeded.to_string(), "deadline_exceeded");
    }
}
