//! Provider adapters
//!
//! A provider is data: a login URL, a selector table keyed by semantic role,
//! and the step plans for signing in and for each supported intent. The
//! sign-in and plan loops live once, in the provided methods of
//! [`ProviderAdapter`]; retrying is the executor's job.

pub mod gmail;
pub mod outlook;
pub mod registry;

use std::collections::BTreeMap;
use std::time::Duration;

use action_flow::{ActionExecutor, StepLog, StepOutcome, StepStatus};
use action_primitives::{ActionKind, ActionStep, ElementQuery, ExecCtx, Session};
use agent_core::{Intent, StructuredTask};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskpilot_core_types::StepId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Credentials;
use crate::errors::EngineError;

pub use gmail::GmailAdapter;
pub use outlook::OutlookAdapter;
pub use registry::{Availability, ProviderRegistry};

/// Semantic roles shared by the mail providers.
pub mod roles {
    pub const MAILBOX_READY: &str = "mailbox-ready";
    pub const LOGIN_ERROR: &str = "login-error";
    pub const EMAIL_FIELD: &str = "email-field";
    pub const EMAIL_NEXT: &str = "email-next";
    pub const PASSWORD_FIELD: &str = "password-field";
    pub const PASSWORD_NEXT: &str = "password-next";
    pub const STAY_SIGNED_IN: &str = "stay-signed-in";
    pub const COMPOSE_BUTTON: &str = "compose-button";
    pub const RECIPIENT_FIELD: &str = "recipient-field";
    pub const SUBJECT_FIELD: &str = "subject-field";
    pub const BODY_FIELD: &str = "body-field";
    pub const SUBMIT_BUTTON: &str = "submit-button";
    pub const SENT_CONFIRMATION: &str = "sent-confirmation";
    pub const SENT_FOLDER: &str = "sent-folder";
}

/// Credential keys every mail provider needs.
pub const MAIL_CREDENTIAL_KEYS: &[&str] = &["email", "password"];

/// What a provider can do and how to find things on its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderCapability {
    name: String,
    /// Roles each supported intent's plan touches.
    intents: BTreeMap<Intent, Vec<String>>,
    credential_keys: Vec<String>,
    selectors: BTreeMap<String, Vec<String>>,
}

impl ProviderCapability {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            intents: BTreeMap::new(),
            credential_keys: Vec::new(),
            selectors: BTreeMap::new(),
        }
    }

    pub fn with_credential_keys(mut self, keys: &[&str]) -> Self {
        self.credential_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Register a role from a comma-separated selector list, in priority order.
    pub fn with_selectors(mut self, role: &str, list: &str) -> Self {
        self.selectors
            .entry(role.to_string())
            .or_default()
            .extend(split_selectors(list));
        self
    }

    pub fn with_intent(mut self, intent: Intent, roles: &[&str]) -> Self {
        self.intents
            .insert(intent, roles.iter().map(|r| r.to_string()).collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn intents(&self) -> impl Iterator<Item = Intent> + '_ {
        self.intents.keys().copied()
    }

    pub fn supports(&self, intent: Intent) -> bool {
        self.intents.contains_key(&intent)
    }

    pub fn roles_for(&self, intent: Intent) -> &[String] {
        self.intents.get(&intent).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn credential_keys(&self) -> &[String] {
        &self.credential_keys
    }

    pub fn candidates(&self, role: &str) -> Option<&[String]> {
        self.selectors
            .get(role)
            .map(Vec::as_slice)
            .filter(|list| !list.is_empty())
    }

    pub fn query(&self, role: &str, timeout: Duration) -> Result<ElementQuery, EngineError> {
        let candidates = self.candidates(role).ok_or_else(|| {
            EngineError::config(format!("{} has no selectors for role '{role}'", self.name))
        })?;
        ElementQuery::new(role, candidates.iter().cloned(), timeout)
            .map_err(|err| EngineError::config(err.to_string()))
    }

    pub fn missing_credentials(&self, credentials: &Credentials) -> Vec<String> {
        self.credential_keys
            .iter()
            .filter(|key| !credentials.has(key))
            .cloned()
            .collect()
    }

    pub fn has_credentials(&self, credentials: &Credentials) -> bool {
        self.missing_credentials(credentials).is_empty()
    }

    /// Every supported intent maps to at least one role, and every mapped
    /// role has at least one selector.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.name.trim().is_empty() {
            return Err(EngineError::config("provider name is empty"));
        }
        if self.intents.is_empty() {
            return Err(EngineError::config(format!(
                "{} supports no intents",
                self.name
            )));
        }
        for (intent, roles) in &self.intents {
            if roles.is_empty() {
                return Err(EngineError::config(format!(
                    "{}: intent {intent} maps to no roles",
                    self.name
                )));
            }
            if let Some(role) = roles.iter().find(|role| self.candidates(role).is_none()) {
                return Err(EngineError::config(format!(
                    "{}: role '{role}' used by {intent} has no selectors",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

/// Split a selector list on top-level commas.
///
/// Commas inside brackets, parentheses or quotes belong to the selector.
pub fn split_selectors(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in list.chars() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '[' | '(') => depth += 1,
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|part| part.trim().to_string())
        .filter(|part| !part.is_empty())
        .collect()
}

/// Deadline and cancellation for one task.
///
/// Steps get an [`ExecCtx`] that carries only the deadline: a step already
/// running finishes (or hits its own timeouts) and cancellation is observed
/// before the next one starts.
#[derive(Debug, Clone)]
pub struct TaskCtx {
    exec: ExecCtx,
    cancel: CancellationToken,
}

impl TaskCtx {
    pub fn new(deadline: Instant, cancel: CancellationToken) -> Self {
        Self {
            exec: ExecCtx::new(deadline, CancellationToken::new()),
            cancel,
        }
    }

    pub fn with_timeout(timeout: Duration, cancel: CancellationToken) -> Self {
        Self::new(Instant::now() + timeout, cancel)
    }

    pub fn exec(&self) -> &ExecCtx {
        &self.exec
    }

    pub fn deadline(&self) -> Instant {
        self.exec.deadline
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn check(&self) -> Result<(), EngineError> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Cancelled("task cancelled".to_string()));
        }
        if self.exec.is_timeout() {
            return Err(EngineError::DeadlineExceeded(
                "task deadline passed".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthOutcome {
    Authenticated,
    /// The mailbox was already open, no credentials were typed.
    AlreadyAuthenticated,
}

/// Result of running an intent plan. Steps that finished are kept even
/// when a later one failed.
#[derive(Debug, Default)]
pub struct IntentOutcome {
    /// Number of steps in the plan.
    pub planned: usize,
    pub steps: Vec<StepOutcome>,
    pub error: Option<EngineError>,
}

impl IntentOutcome {
    /// A submit took effect, so the task changed something in the service.
    pub fn committed(&self) -> bool {
        self.steps.iter().any(|step| {
            step.kind == ActionKind::Submit
                && matches!(
                    step.status,
                    StepStatus::Completed | StepStatus::AlreadyCompleted
                )
        })
    }
}

/// One web service the engine can act in.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn capability(&self) -> &ProviderCapability;

    fn login_url(&self) -> &str;

    /// Wait applied to each selector candidate.
    fn selector_timeout(&self) -> Duration;

    /// Steps that sign in from the login page.
    fn auth_steps(&self, credentials: &Credentials) -> Result<Vec<ActionStep>, EngineError>;

    /// Steps that carry out `task` in a signed-in session.
    fn plan_steps(&self, task: &StructuredTask) -> Result<Vec<ActionStep>, EngineError>;

    fn name(&self) -> &str {
        self.capability().name()
    }

    fn query(&self, role: &str) -> Result<ElementQuery, EngineError> {
        self.capability().query(role, self.selector_timeout())
    }

    /// Open the login page and sign in unless the mailbox is already there.
    async fn authenticate(
        &self,
        session: &mut Session,
        executor: &dyn ActionExecutor,
        credentials: &Credentials,
        ctx: &TaskCtx,
        log: &mut StepLog,
    ) -> Result<AuthOutcome, EngineError> {
        let provider = self.name().to_string();
        let missing = self.capability().missing_credentials(credentials);
        if !missing.is_empty() {
            return Err(EngineError::authentication(
                &provider,
                format!("missing credentials: {}", missing.join(", ")),
            ));
        }

        ctx.check()?;
        let open = ActionStep::navigate("open-login", self.login_url())
            .with_id(StepId::from("auth-open"));
        executor
            .execute(session, &open, ctx.exec(), log)
            .await
            .map_err(|err| EngineError::from_auth_failure(&provider, err))?;

        let ready = self.query(roles::MAILBOX_READY)?;
        let already = executor
            .resolver()
            .probe(session, &ready)
            .await
            .map_err(|err| EngineError::from_auth_failure(&provider, err.into()))?;
        if let Some(found) = already {
            info!(provider = %provider, selector = %found.selector, "Mailbox already open");
            return Ok(AuthOutcome::AlreadyAuthenticated);
        }

        for step in self.auth_steps(credentials)? {
            ctx.check()?;
            executor
                .execute(session, &step, ctx.exec(), log)
                .await
                .map_err(|err| EngineError::from_auth_failure(&provider, err))?;
        }

        if let Some(reason) = self.login_error(session, executor).await {
            return Err(EngineError::authentication(&provider, reason));
        }

        match executor.resolver().resolve(session, &ready, ctx.exec()).await {
            Ok(_) => {
                info!(provider = %provider, "Signed in");
                Ok(AuthOutcome::Authenticated)
            }
            Err(err) => {
                // The error banner may show up only after the last click settles.
                let err = EngineError::from_auth_failure(&provider, err.into());
                match (self.login_error(session, executor).await, err) {
                    (Some(reason), EngineError::Authentication { artifacts, .. }) => {
                        Err(EngineError::Authentication {
                            provider,
                            reason,
                            artifacts,
                        })
                    }
                    (_, err) => Err(err),
                }
            }
        }
    }

    /// Reason the login page is showing an error, if it is.
    async fn login_error(
        &self,
        session: &Session,
        executor: &dyn ActionExecutor,
    ) -> Option<String> {
        let query = match self.capability().candidates(roles::LOGIN_ERROR) {
            Some(_) => self.query(roles::LOGIN_ERROR).ok()?,
            None => return None,
        };
        match executor.resolver().probe(session, &query).await {
            Ok(Some(found)) => {
                warn!(provider = self.name(), selector = %found.selector, "Login rejected");
                Some(format!("credentials rejected ({})", found.selector))
            }
            Ok(None) => None,
            Err(err) => {
                debug!(%err, "login error probe failed");
                None
            }
        }
    }

    /// Run the plan for `task`, stopping at the first failed step.
    async fn execute_intent(
        &self,
        session: &mut Session,
        executor: &dyn ActionExecutor,
        task: &StructuredTask,
        ctx: &TaskCtx,
        log: &mut StepLog,
    ) -> IntentOutcome {
        let mut outcome = IntentOutcome::default();
        let steps = match self.plan_steps(task) {
            Ok(steps) => steps,
            Err(err) => {
                outcome.error = Some(err);
                return outcome;
            }
        };
        outcome.planned = steps.len();
        info!(
            provider = self.name(),
            intent = %task.intent(),
            steps = steps.len(),
            "Executing plan"
        );

        for step in &steps {
            if let Err(err) = ctx.check() {
                outcome.error = Some(err);
                break;
            }
            match executor.execute(session, step, ctx.exec(), log).await {
                Ok(done) => outcome.steps.push(done),
                Err(err) => {
                    outcome.error = Some(err.into());
                    break;
                }
            }
        }
        outcome
    }
}

/// Sign-in form shared by the mail providers: email, next, password, next.
pub(crate) fn mail_login_steps(
    adapter: &dyn ProviderAdapter,
    credentials: &Credentials,
) -> Result<Vec<ActionStep>, EngineError> {
    let email = credential(adapter, credentials, "email")?;
    let password = credential(adapter, credentials, "password")?;
    let steps = vec![
        ActionStep::type_text("enter-email", adapter.query(roles::EMAIL_FIELD)?, email),
        ActionStep::click("email-next", adapter.query(roles::EMAIL_NEXT)?),
        ActionStep::type_text("enter-password", adapter.query(roles::PASSWORD_FIELD)?, password),
        ActionStep::submit("password-next", adapter.query(roles::PASSWORD_NEXT)?),
    ];
    Ok(number_steps("auth", steps))
}

fn credential<'a>(
    adapter: &dyn ProviderAdapter,
    credentials: &'a Credentials,
    key: &str,
) -> Result<&'a str, EngineError> {
    credentials
        .get(key)
        .ok_or_else(|| EngineError::authentication(adapter.name(), format!("missing {key}")))
}

/// Compose, address, write, send, then open the sent folder.
pub(crate) fn compose_message_steps(
    adapter: &dyn ProviderAdapter,
    task: &StructuredTask,
) -> Result<Vec<ActionStep>, EngineError> {
    if task.recipients().is_empty() {
        return Err(EngineError::interpretation("message has no recipients"));
    }
    let steps = vec![
        ActionStep::click("open-compose", adapter.query(roles::COMPOSE_BUTTON)?),
        ActionStep::type_text(
            "fill-recipients",
            adapter.query(roles::RECIPIENT_FIELD)?,
            task.recipients().join(", "),
        ),
        ActionStep::type_text("fill-subject", adapter.query(roles::SUBJECT_FIELD)?, task.subject()),
        ActionStep::type_text("fill-body", adapter.query(roles::BODY_FIELD)?, task.body()),
        ActionStep::submit("send", adapter.query(roles::SUBMIT_BUTTON)?)
            .with_completion(adapter.query(roles::SENT_CONFIRMATION)?),
        ActionStep::click("verify-sent", adapter.query(roles::SENT_FOLDER)?),
    ];
    Ok(number_steps("send", steps))
}

/// Give plan steps position-based ids (`prefix-1`, `prefix-2`, ...).
pub(crate) fn number_steps(prefix: &str, steps: Vec<ActionStep>) -> Vec<ActionStep> {
    steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| step.with_id(StepId::indexed(prefix, index)))
        .collect()
}

pub(crate) fn unsupported(adapter: &dyn ProviderAdapter, intent: Intent) -> EngineError {
    EngineError::no_provider(format!("{} does not support {intent}", adapter.name()))
}
