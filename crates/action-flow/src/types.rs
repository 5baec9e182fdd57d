//! Step outcome and log record types

use action_primitives::{ActionKind, ActionReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use taskpilot_core_types::{StepId, TaskId};

/// How a step finished when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    /// Completion probe showed the step had already taken effect.
    AlreadyCompleted,
    /// Optional step whose element never appeared.
    Skipped,
}

/// Outcome of one attempt, as written to the step log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Succeeded,
    AlreadyCompleted,
    Skipped,
    /// Failed with a retryable error; another attempt follows.
    Retrying,
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Succeeded => "succeeded",
            AttemptOutcome::AlreadyCompleted => "already_completed",
            AttemptOutcome::Skipped => "skipped",
            AttemptOutcome::Retrying => "retrying",
            AttemptOutcome::Failed => "failed",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::Succeeded | AttemptOutcome::AlreadyCompleted | AttemptOutcome::Skipped
        )
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only entry of a task's step log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub task_id: TaskId,
    pub step_id: StepId,
    pub label: String,
    pub kind: ActionKind,
    /// 1-based attempt number
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Selector that matched, if the attempt got that far
    pub selector: Option<String>,
    pub detail: Option<String>,
}

/// Result of a step that did not fail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step_id: StepId,
    pub label: String,
    pub kind: ActionKind,
    pub status: StepStatus,

    /// Attempts used, including the successful one
    pub attempts: u32,

    pub selector: Option<String>,
    pub candidate_index: Option<usize>,

    /// Action report of the successful primitive call
    pub action_report: Option<ActionReport>,

    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl StepOutcome {
    pub fn new(step_id: StepId, label: impl Into<String>, kind: ActionKind) -> Self {
        let now = Utc::now();
        Self {
            step_id,
            label: label.into(),
            kind,
            status: StepStatus::Completed,
            attempts: 0,
            selector: None,
            candidate_index: None,
            action_report: None,
            started_at: now,
            finished_at: now,
            latency_ms: 0,
        }
    }

    pub fn with_status(mut self, status: StepStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_selector(mut self, selector: impl Into<String>, candidate_index: usize) -> Self {
        self.selector = Some(selector.into());
        self.candidate_index = Some(candidate_index);
        self
    }

    pub fn with_report(mut self, report: ActionReport) -> Self {
        self.action_report = Some(report);
        self
    }

    /// Set finish time and calculate latency
    pub fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self.latency_ms = (self.finished_at - self.started_at)
            .num_milliseconds()
            .max(0) as u64;
        self
    }

    /// Whether a non-primary selector matched.
    pub fn used_fallback(&self) -> bool {
        self.candidate_index.map(|i| i > 0).unwrap_or(false)
    }
}
