//! Step executor: resolution plus interaction inside a bounded retry loop

use crate::log::StepLog;
use crate::strategies::RetryPolicy;
use crate::types::*;
use action_locator::{ElementResolver, Resolution};
use action_primitives::{
    execute_click, execute_navigate, execute_submit, execute_type_text, ActionError, ActionKind,
    ActionReport, ActionStep, ExecCtx, Session,
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Action executor trait
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute one step, retrying retryable failures per the retry policy.
    async fn execute(
        &self,
        session: &mut Session,
        step: &ActionStep,
        ctx: &ExecCtx,
        log: &mut StepLog,
    ) -> Result<StepOutcome, ActionError>;

    /// Resolver used for targets, shared so callers can probe with it.
    fn resolver(&self) -> &dyn ElementResolver;

    fn policy(&self) -> RetryPolicy;
}

/// What a single successful attempt produced.
struct AttemptSuccess {
    status: StepStatus,
    resolution: Option<Resolution>,
    report: Option<ActionReport>,
}

/// Default action executor implementation
pub struct DefaultActionExecutor {
    resolver: Arc<dyn ElementResolver>,
    policy: RetryPolicy,
}

impl DefaultActionExecutor {
    /// Create a new action executor
    pub fn new(resolver: Arc<dyn ElementResolver>, policy: RetryPolicy) -> Self {
        Self { resolver, policy }
    }

    async fn attempt(
        &self,
        session: &mut Session,
        step: &ActionStep,
        ctx: &ExecCtx,
    ) -> Result<AttemptSuccess, ActionError> {
        if step.kind == ActionKind::Submit {
            if let Some(completion) = &step.completion {
                if let Some(found) = self.resolver.probe(session, completion).await? {
                    debug!(
                        step = %step.id,
                        selector = %found.selector,
                        "completion marker present, not submitting again"
                    );
                    return Ok(AttemptSuccess {
                        status: StepStatus::AlreadyCompleted,
                        resolution: Some(found),
                        report: None,
                    });
                }
            }
        }

        let (resolution, report) = match step.kind {
            ActionKind::Navigate => {
                let url = step.payload.as_deref().unwrap_or_default();
                (None, execute_navigate(session, ctx, url).await?)
            }
            kind => {
                let target = step.target.as_ref().ok_or_else(|| {
                    ActionError::InvalidStep(format!("{}: missing target", step.label))
                })?;
                // Absence of an optional element is expected, so no artifacts for it.
                let resolution = self
                    .resolver
                    .resolve_with(session, target, ctx, !step.optional)
                    .await?;
                let element = &resolution.element;
                let report = match kind {
                    ActionKind::Type => {
                        let text = step.payload.as_deref().unwrap_or_default();
                        execute_type_text(session, ctx, element, text).await?
                    }
                    ActionKind::Submit => execute_submit(session, ctx, element).await?,
                    _ => execute_click(session, ctx, element).await?,
                };
                (Some(resolution), report)
            }
        };

        Ok(AttemptSuccess {
            status: StepStatus::Completed,
            resolution,
            report: Some(report),
        })
    }

    /// Sleep the backoff unless the task is cancelled first.
    async fn backoff(&self, attempt: u32, ctx: &ExecCtx) -> Result<(), ActionError> {
        let delay = self.policy.calculate_backoff(attempt);
        if delay.is_zero() {
            return Ok(());
        }
        if delay >= ctx.remaining_time() {
            return Err(ActionError::DeadlineExceeded(format!(
                "backoff of {}ms exceeds remaining task time",
                delay.as_millis()
            )));
        }
        debug!(attempt, delay_ms = delay.as_millis() as u64, "backing off");
        tokio::select! {
            _ = sleep(delay) => Ok(()),
            _ = ctx.cancel_token.cancelled() => {
                Err(ActionError::Interrupted("cancelled during backoff".to_string()))
            }
        }
    }
}

fn is_not_found(err: &ActionError) -> bool {
    matches!(err, ActionError::ElementNotFound { .. })
}

#[async_trait]
impl ActionExecutor for DefaultActionExecutor {
    async fn execute(
        &self,
        session: &mut Session,
        step: &ActionStep,
        ctx: &ExecCtx,
        log: &mut StepLog,
    ) -> Result<StepOutcome, ActionError> {
        let outcome = StepOutcome::new(step.id.clone(), step.label.clone(), step.kind);

        if let Err(err) = step.validate() {
            log.record(step, 1, AttemptOutcome::Failed, None, Some(err.to_string()));
            return Err(err);
        }

        info!(
            step = %step.id,
            kind = %step.kind,
            optional = step.optional,
            max_attempts = self.policy.max_attempts,
            "Executing step"
        );

        let mut attempt = 1;
        loop {
            let result = match self.backoff(attempt, ctx).await.and_then(|_| ctx.check()) {
                Ok(()) => self.attempt(session, step, ctx).await,
                Err(err) => Err(err),
            };

            match result {
                Ok(success) => {
                    let log_outcome = match success.status {
                        StepStatus::Completed => AttemptOutcome::Succeeded,
                        StepStatus::AlreadyCompleted => AttemptOutcome::AlreadyCompleted,
                        StepStatus::Skipped => AttemptOutcome::Skipped,
                    };
                    let selector = success.resolution.as_ref().map(|r| r.selector.clone());
                    log.record(step, attempt, log_outcome, selector, None);

                    let mut outcome = outcome.with_status(success.status).with_attempts(attempt);
                    if let Some(resolution) = success.resolution {
                        outcome = outcome
                            .with_selector(resolution.selector, resolution.candidate_index);
                    }
                    if let Some(report) = success.report {
                        outcome = outcome.with_report(report);
                    }
                    return Ok(outcome.finish());
                }
                Err(err) if step.optional && is_not_found(&err) => {
                    log.record(
                        step,
                        attempt,
                        AttemptOutcome::Skipped,
                        None,
                        Some(err.to_string()),
                    );
                    info!(step = %step.id, "optional step skipped");
                    return Ok(outcome
                        .with_status(StepStatus::Skipped)
                        .with_attempts(attempt)
                        .finish());
                }
                Err(err) if err.is_retryable() && self.policy.should_retry(attempt) => {
                    log.record(
                        step,
                        attempt,
                        AttemptOutcome::Retrying,
                        None,
                        Some(err.to_string()),
                    );
                    warn!(step = %step.id, attempt, error = %err, "retryable failure");
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    log.record(step, attempt, AttemptOutcome::Failed, None, Some(err.to_string()));
                    warn!(step = %step.id, attempts = attempt, error = %err, "retries exhausted");
                    return Err(ActionError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(err),
                    });
                }
                Err(err) => {
                    log.record(step, attempt, AttemptOutcome::Failed, None, Some(err.to_string()));
                    warn!(step = %step.id, attempt, error = %err, "fatal failure");
                    return Err(err);
                }
            }
        }
    }

    fn resolver(&self) -> &dyn ElementResolver {
        self.resolver.as_ref()
    }

    fn policy(&self) -> RetryPolicy {
        self.policy
    }
}
