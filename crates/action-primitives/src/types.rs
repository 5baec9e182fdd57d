//! Core data types for action primitives

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use taskpilot_core_types::StepId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::ActionError;

/// Execution context for action primitives
///
/// Carries the task deadline and the cancellation token every step checks
/// before it touches the browser.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Deadline for this operation
    pub deadline: Instant,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier for this action
    pub action_id: String,
}

impl ExecCtx {
    /// Create a new execution context
    pub fn new(deadline: Instant, cancel_token: CancellationToken) -> Self {
        Self {
            deadline,
            cancel_token,
            action_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_timeout(timeout: Duration, cancel_token: CancellationToken) -> Self {
        Self::new(Instant::now() + timeout, cancel_token)
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if this context has exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Get remaining time until deadline
    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Fails with `Interrupted` or `DeadlineExceeded` when the step must not start.
    pub fn check(&self) -> Result<(), ActionError> {
        if self.is_cancelled() {
            return Err(ActionError::Interrupted("Context cancelled".to_string()));
        }
        if self.is_timeout() {
            return Err(ActionError::DeadlineExceeded(
                "Context deadline exceeded".to_string(),
            ));
        }
        Ok(())
    }
}

/// Semantic element lookup: a role plus ordered fallback selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementQuery {
    role: String,
    candidates: Vec<String>,
    timeout_ms: u64,
}

impl ElementQuery {
    pub fn new<I, S>(
        role: impl Into<String>,
        candidates: I,
        timeout: Duration,
    ) -> Result<Self, ActionError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let role = role.into();
        let candidates: Vec<String> = candidates
            .into_iter()
            .map(Into::into)
            .map(|s: String| s.trim().to_string())
            .collect();
        if candidates.is_empty() {
            return Err(ActionError::InvalidQuery(format!(
                "role '{role}' has no candidate selectors"
            )));
        }
        if candidates.iter().any(String::is_empty) {
            return Err(ActionError::InvalidQuery(format!(
                "role '{role}' has a blank selector"
            )));
        }
        Ok(Self {
            role,
            candidates,
            timeout_ms: timeout.as_millis() as u64,
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn candidates(&self) -> &[String] {
        &self.candidates
    }

    /// Per-candidate wait budget.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Navigate,
    Click,
    Type,
    Submit,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::Navigate => "navigate",
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Submit => "submit",
        };
        f.write_str(name)
    }
}

/// One unit of UI work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStep {
    pub id: StepId,
    pub label: String,
    pub kind: ActionKind,
    pub target: Option<ElementQuery>,
    /// Text for `Type`, URL for `Navigate`.
    pub payload: Option<String>,
    /// Presence of this element means the step already took effect.
    pub completion: Option<ElementQuery>,
    /// Skip instead of failing when the target never shows up.
    pub optional: bool,
}

impl ActionStep {
    fn build(
        label: impl Into<String>,
        kind: ActionKind,
        target: Option<ElementQuery>,
        payload: Option<String>,
    ) -> Self {
        let label = label.into();
        Self {
            id: StepId::from(label.as_str()),
            label,
            kind,
            target,
            payload,
            completion: None,
            optional: false,
        }
    }

    pub fn navigate(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self::build(label, ActionKind::Navigate, None, Some(url.into()))
    }

    pub fn click(label: impl Into<String>, target: ElementQuery) -> Self {
        Self::build(label, ActionKind::Click, Some(target), None)
    }

    pub fn type_text(
        label: impl Into<String>,
        target: ElementQuery,
        text: impl Into<String>,
    ) -> Self {
        Self::build(label, ActionKind::Type, Some(target), Some(text.into()))
    }

    pub fn submit(label: impl Into<String>, target: ElementQuery) -> Self {
        Self::build(label, ActionKind::Submit, Some(target), None)
    }

    pub fn with_id(mut self, id: StepId) -> Self {
        self.id = id;
        self
    }

    pub fn with_completion(mut self, completion: ElementQuery) -> Self {
        self.completion = Some(completion);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Shape check: navigation needs a URL, element steps need a target,
    /// typing needs text.
    pub fn validate(&self) -> Result<(), ActionError> {
        match self.kind {
            ActionKind::Navigate if self.payload.is_none() => Err(ActionError::InvalidStep(
                format!("{}: navigate without url", self.label),
            )),
            ActionKind::Navigate => Ok(()),
            _ if self.target.is_none() => Err(ActionError::InvalidStep(format!(
                "{}: {} without target",
                self.label, self.kind
            ))),
            ActionKind::Type if self.payload.is_none() => Err(ActionError::InvalidStep(
                format!("{}: type without text", self.label),
            )),
            _ => Ok(()),
        }
    }
}

/// Outcome of a single primitive call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionReport {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub started_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub finished_at: DateTime<Utc>,

    pub latency_ms: u64,

    /// Selector the primitive acted on, if any.
    pub selector: Option<String>,

    /// URL after action (if known)
    pub url_after: Option<String>,
}

impl ActionReport {
    /// Create a successful action report
    pub fn success(started_at: DateTime<Utc>, latency_ms: u64) -> Self {
        Self {
            started_at,
            finished_at: Utc::now(),
            latency_ms,
            selector: None,
            url_after: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url_after = url;
        self
    }
}
