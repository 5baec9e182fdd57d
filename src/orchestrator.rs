//! Task orchestration
//!
//! One call to [`ExecutionOrchestrator::run`] takes an instruction through
//! interpretation, provider selection, a dedicated browser session, sign-in
//! and the intent plan, and always comes back with an [`ExecutionResult`].
//! Once a session was acquired it is released before the result is built.

use std::sync::Arc;

use action_flow::{
    ActionExecutor, DefaultActionExecutor, LogRecord, LogSink, StepLog, StepOutcome, TracingSink,
};
use action_locator::DefaultElementResolver;
use action_primitives::{Artifacts, Session};
use agent_core::{DomAnalyzer, InstructionInterpreter, LlmProvider, StructuredTask};
use cdp_adapter::BrowserDriver;
use chrono::{DateTime, Utc};
use serde::Serialize;
use taskpilot_core_types::TaskId;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::EngineConfig;
use crate::errors::{EngineError, ErrorKind};
use crate::llm::LlmSelectorAdvisor;
use crate::providers::{AuthOutcome, ProviderAdapter, ProviderRegistry, TaskCtx};
use crate::sessions::SessionManager;

/// What the caller asks for.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub instruction: String,
    /// Overrides any provider named in the instruction.
    pub provider_hint: Option<String>,
    pub cancel: CancellationToken,
}

impl TaskRequest {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            provider_hint: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_provider_hint(mut self, provider: impl Into<String>) -> Self {
        self.provider_hint = Some(provider.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    /// Signed in and a submit took effect before a later step failed.
    PartiallyFailed,
    Failed,
}

impl ExecutionStatus {
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionStatus::Succeeded => 0,
            ExecutionStatus::PartiallyFailed => 2,
            ExecutionStatus::Failed => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    Created,
    Interpreting,
    ProviderSelected,
    SessionAcquired,
    Authenticating,
    Executing,
    Succeeded,
    PartiallyFailed,
    Failed,
    SessionReleased,
}

impl From<ExecutionStatus> for OrchestratorState {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Succeeded => OrchestratorState::Succeeded,
            ExecutionStatus::PartiallyFailed => OrchestratorState::PartiallyFailed,
            ExecutionStatus::Failed => OrchestratorState::Failed,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub task_id: TaskId,
    pub status: ExecutionStatus,
    pub message: String,
    pub error_kind: Option<ErrorKind>,
    pub provider: Option<String>,
    pub task: Option<StructuredTask>,
    pub auth: Option<AuthOutcome>,
    pub steps: Vec<StepOutcome>,
    /// Length of the intent plan; 0 when no plan was built.
    pub steps_planned: usize,
    /// Every attempt of every step, in order.
    pub log: Vec<LogRecord>,
    pub artifacts: Option<Artifacts>,
    pub states: Vec<OrchestratorState>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub latency_ms: u64,
}

impl ExecutionResult {
    pub fn exit_code(&self) -> i32 {
        self.status.exit_code()
    }
}

/// Progress of one run, turned into the result at the end.
struct RunTrace {
    task_id: TaskId,
    started_at: DateTime<Utc>,
    clock: Instant,
    states: Vec<OrchestratorState>,
    task: Option<StructuredTask>,
    provider: Option<String>,
    auth: Option<AuthOutcome>,
    steps: Vec<StepOutcome>,
    planned: usize,
    committed: bool,
}

impl RunTrace {
    fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            started_at: Utc::now(),
            clock: Instant::now(),
            states: vec![OrchestratorState::Created],
            task: None,
            provider: None,
            auth: None,
            steps: Vec::new(),
            planned: 0,
            committed: false,
        }
    }

    fn enter(&mut self, state: OrchestratorState) {
        debug!(?state, "Task state");
        self.states.push(state);
    }

    /// Failure before a session exists.
    fn fail(mut self, err: EngineError, log: StepLog) -> ExecutionResult {
        self.enter(OrchestratorState::Failed);
        self.finish(ExecutionStatus::Failed, Some(err), None, None, log)
    }

    fn finish(
        self,
        status: ExecutionStatus,
        error: Option<EngineError>,
        artifacts: Option<Artifacts>,
        teardown: Option<EngineError>,
        log: StepLog,
    ) -> ExecutionResult {
        let latency_ms = self.clock.elapsed().as_millis() as u64;
        let mut message = match (&error, &self.task, &self.provider) {
            (Some(err), _, _) => err.to_string(),
            (None, Some(task), Some(provider)) => {
                format!("{} completed via {provider}", task.intent())
            }
            (None, _, _) => "completed".to_string(),
        };
        if error.is_some() && self.planned > 0 {
            message.push_str(&format!(
                " (after {} of {} planned steps)",
                self.steps.len(),
                self.planned
            ));
        }
        if let Some(err) = &teardown {
            message.push_str(&format!("; {err}"));
        }

        match &error {
            None => info!(latency_ms, steps = self.steps.len(), "Task succeeded"),
            Some(err) => {
                warn!(?status, kind = %err.kind(), error = %err, latency_ms, "Task failed")
            }
        }

        ExecutionResult {
            task_id: self.task_id,
            status,
            message,
            error_kind: error.as_ref().map(EngineError::kind),
            provider: self.provider,
            task: self.task,
            auth: self.auth,
            steps: self.steps,
            steps_planned: self.planned,
            log: log.into_records(),
            artifacts,
            states: self.states,
            started_at: self.started_at,
            finished_at: Utc::now(),
            latency_ms,
        }
    }
}

pub struct ExecutionOrchestrator {
    config: Arc<EngineConfig>,
    interpreter: Arc<InstructionInterpreter>,
    registry: Arc<ProviderRegistry>,
    sessions: Arc<SessionManager>,
    executor: Arc<dyn ActionExecutor>,
    sink: Arc<dyn LogSink>,
}

impl ExecutionOrchestrator {
    pub fn new(
        config: EngineConfig,
        interpreter: Arc<InstructionInterpreter>,
        registry: Arc<ProviderRegistry>,
        sessions: Arc<SessionManager>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            interpreter,
            registry,
            sessions,
            executor,
            sink: Arc::new(TracingSink),
        }
    }

    /// Wire the built-in providers, the default resolver and executor, and
    /// the interpreter (with `llm` when given) from `config`.
    pub fn from_config(
        config: EngineConfig,
        driver: Arc<dyn BrowserDriver>,
        llm: Option<Arc<dyn LlmProvider>>,
    ) -> Result<Self, EngineError> {
        let registry = ProviderRegistry::with_builtin(config.selector_timeout())?;
        let names = registry.names();
        config.validate(&names)?;
        registry.set_default(config.default_provider.clone());

        let mut interpreter =
            InstructionInterpreter::new(&names).with_timeout(config.llm_timeout());
        let mut resolver =
            DefaultElementResolver::new().capture_on_exhaustion(config.capture_on_error);
        if let Some(llm) = llm {
            if config.llm.dom_analysis {
                let analyzer = DomAnalyzer::new(llm.clone()).with_timeout(config.llm_timeout());
                resolver = resolver.with_advisor(Arc::new(LlmSelectorAdvisor::new(analyzer)));
            }
            interpreter = interpreter.with_llm(llm);
        }

        let executor = DefaultActionExecutor::new(Arc::new(resolver), config.retry_policy());
        let sessions = SessionManager::new(driver, config.artifacts_dir.clone());

        Ok(Self::new(
            config,
            Arc::new(interpreter),
            Arc::new(registry),
            Arc::new(sessions),
            Arc::new(executor),
        ))
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn interpreter(&self) -> &InstructionInterpreter {
        &self.interpreter
    }

    pub async fn run(&self, request: TaskRequest) -> ExecutionResult {
        let task_id = TaskId::new();
        let span = info_span!("task", task_id = %task_id);
        self.run_task(task_id, request).instrument(span).await
    }

    async fn run_task(&self, task_id: TaskId, request: TaskRequest) -> ExecutionResult {
        let mut run = RunTrace::new(task_id.clone());
        let mut log = StepLog::new(task_id, Arc::clone(&self.sink));
        let ctx = TaskCtx::with_timeout(self.config.task_timeout(), request.cancel.clone());
        info!(instruction = %request.instruction, "Task started");

        run.enter(OrchestratorState::Interpreting);
        let task = match self.interpret(&request.instruction, &ctx).await {
            Ok(task) => task,
            Err(err) => return run.fail(err, log),
        };
        run.task = Some(task.clone());
        let missing = task.missing_fields();
        if !missing.is_empty() {
            let err = EngineError::interpretation(format!(
                "instruction does not name the {}",
                missing.join(", ")
            ));
            return run.fail(err, log);
        }

        let availability = self.registry.availability(&self.config);
        let hint = request.provider_hint.as_deref().or(task.provider_hint());
        let provider = match ctx
            .check()
            .and_then(|_| self.registry.select_for(task.intent(), hint, &availability))
        {
            Ok(provider) => provider,
            Err(err) => return run.fail(err, log),
        };
        run.provider = Some(provider.name().to_string());
        run.enter(OrchestratorState::ProviderSelected);
        info!(provider = provider.name(), intent = %task.intent(), "Provider selected");

        if let Err(err) = ctx.check() {
            return run.fail(err, log);
        }
        let mut lease = match self.sessions.acquire(&run.task_id).await {
            Ok(lease) => lease,
            Err(err) => return run.fail(err, log),
        };
        run.enter(OrchestratorState::SessionAcquired);

        let error = match lease.session_mut() {
            Some(session) => {
                self.session_phase(provider.as_ref(), session, &task, &ctx, &mut log, &mut run)
                    .await
            }
            None => Some(EngineError::session("lease holds no session")),
        };

        let status = match &error {
            None => ExecutionStatus::Succeeded,
            Some(_) if run.auth.is_some() && run.committed => ExecutionStatus::PartiallyFailed,
            Some(_) => ExecutionStatus::Failed,
        };
        run.enter(status.into());

        let artifacts = match (&error, lease.session()) {
            (Some(err), _) if err.artifacts().is_some() => err.artifacts().cloned(),
            (Some(_), Some(session)) if self.config.capture_on_error => {
                Some(session.capture_artifacts("task-failure").await).filter(|a| !a.is_empty())
            }
            _ => None,
        };

        let teardown = self.sessions.release(lease).await.err();
        run.enter(OrchestratorState::SessionReleased);
        run.finish(status, error, artifacts, teardown, log)
    }

    async fn interpret(
        &self,
        instruction: &str,
        ctx: &TaskCtx,
    ) -> Result<StructuredTask, EngineError> {
        ctx.check()?;
        let interpretation = timeout_at(ctx.deadline(), self.interpreter.interpret(instruction));
        tokio::select! {
            result = interpretation => match result {
                Ok(task) => Ok(task?),
                Err(_) => Err(EngineError::DeadlineExceeded(
                    "interpretation ran past the task deadline".to_string(),
                )),
            },
            _ = ctx.cancel_token().cancelled() => {
                Err(EngineError::Cancelled("cancelled during interpretation".to_string()))
            }
        }
    }

    /// Sign in, then run the plan. Returns the error that stopped the task.
    async fn session_phase(
        &self,
        provider: &dyn ProviderAdapter,
        session: &mut Session,
        task: &StructuredTask,
        ctx: &TaskCtx,
        log: &mut StepLog,
        run: &mut RunTrace,
    ) -> Option<EngineError> {
        run.enter(OrchestratorState::Authenticating);
        let credentials = self.config.credentials_for(provider.name());
        match provider
            .authenticate(session, self.executor.as_ref(), &credentials, ctx, log)
            .await
        {
            Ok(outcome) => run.auth = Some(outcome),
            Err(err) => return Some(err),
        }

        run.enter(OrchestratorState::Executing);
        let outcome = provider
            .execute_intent(session, self.executor.as_ref(), task, ctx, log)
            .await;
        run.committed = outcome.committed();
        run.planned = outcome.planned;
        run.steps = outcome.steps;
        outcome.error
    }
}
