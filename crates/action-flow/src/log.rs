//! Per-task step log and the sinks it forwards to.
//!
//! A [`StepLog`] is created for one task and handed down explicitly; there is
//! no process-wide log state, so concurrent tasks never share records.

use std::fmt;
use std::sync::Arc;

use action_primitives::ActionStep;
use chrono::Utc;
use parking_lot::Mutex;
use taskpilot_core_types::TaskId;
use tracing::{info, warn};

use crate::types::{AttemptOutcome, LogRecord};

/// Append-only consumer of step records.
pub trait LogSink: Send + Sync {
    fn append(&self, record: &LogRecord);
}

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn append(&self, record: &LogRecord) {
        if record.outcome.is_success() {
            info!(
                task_id = %record.task_id,
                step = %record.step_id,
                kind = %record.kind,
                attempt = record.attempt,
                outcome = %record.outcome,
                selector = record.selector.as_deref().unwrap_or("-"),
                "step attempt"
            );
        } else {
            warn!(
                task_id = %record.task_id,
                step = %record.step_id,
                kind = %record.kind,
                attempt = record.attempt,
                outcome = %record.outcome,
                detail = record.detail.as_deref().unwrap_or("-"),
                "step attempt"
            );
        }
    }
}

/// Collects records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl LogSink for MemorySink {
    fn append(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}

/// Ordered attempt log of one task.
pub struct StepLog {
    task_id: TaskId,
    records: Vec<LogRecord>,
    sink: Arc<dyn LogSink>,
}

impl StepLog {
    pub fn new(task_id: TaskId, sink: Arc<dyn LogSink>) -> Self {
        Self {
            task_id,
            records: Vec::new(),
            sink,
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn record(
        &mut self,
        step: &ActionStep,
        attempt: u32,
        outcome: AttemptOutcome,
        selector: Option<String>,
        detail: Option<String>,
    ) {
        let record = LogRecord {
            timestamp: Utc::now(),
            task_id: self.task_id.clone(),
            step_id: step.id.clone(),
            label: step.label.clone(),
            kind: step.kind,
            attempt,
            outcome,
            selector,
            detail,
        };
        self.sink.append(&record);
        self.records.push(record);
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<LogRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Debug for StepLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepLog")
            .field("task_id", &self.task_id)
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_forwarded_in_order() {
        let sink = Arc::new(MemorySink::new());
        let task = TaskId::new();
        let mut log = StepLog::new(task.clone(), sink.clone());
        let step = ActionStep::navigate("open-login", "https://mail.example");

        log.record(&step, 1, AttemptOutcome::Retrying, None, Some("timeout".into()));
        log.record(&step, 2, AttemptOutcome::Succeeded, None, None);

        assert_eq!(log.len(), 2);
        let forwarded = sink.records();
        assert_eq!(forwarded, log.records());
        assert_eq!(forwarded[0].attempt, 1);
        assert_eq!(forwarded[1].outcome, AttemptOutcome::Succeeded);
        assert!(forwarded.iter().all(|r| r.task_id == task));
    }

    #[test]
    fn logs_of_different_tasks_do_not_mix() {
        let sink_a = Arc::new(MemorySink::new());
        let sink_b = Arc::new(MemorySink::new());
        let mut a = StepLog::new(TaskId::new(), sink_a.clone());
        let mut b = StepLog::new(TaskId::new(), sink_b.clone());
        let step = ActionStep::navigate("open", "https://x.example");

        a.record(&step, 1, AttemptOutcome::Succeeded, None, None);
        b.record(&step, 1, AttemptOutcome::Failed, None, None);
        b.record(&step, 2, AttemptOutcome::Failed, None, None);

        assert_eq!(sink_a.len(), 1);
        assert_eq!(sink_b.len(), 2);
        assert_ne!(a.task_id(), b.task_id());
    }

    #[test]
    fn tracing_sink_accepts_records() {
        let mut log = StepLog::new(TaskId::new(), Arc::new(TracingSink));
        let step = ActionStep::navigate("open", "https://x.example");
        log.record(&step, 1, AttemptOutcome::Failed, None, Some("boom".into()));
        assert_eq!(log.into_records().len(), 1);
    }
}
