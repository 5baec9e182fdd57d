mod common;

use std::sync::Arc;

use action_flow::{AttemptOutcome, LogRecord, LogSink, StepStatus};
use agent_core::{Intent, LlmError, LlmProvider, MockLlmProvider};
use cdp_adapter::{AdapterErrorKind, Interaction, MemoryDriver};
use common::{engine_config, orchestrator, MailPage};
use taskpilot_cli::providers::roles;
use taskpilot_cli::{
    AuthOutcome, ErrorKind, ExecutionOrchestrator, ExecutionResult, ExecutionStatus, GmailAdapter,
    OrchestratorState, OutlookAdapter, ProviderAdapter, TaskRequest,
};
use tokio_util::sync::CancellationToken;

const INSTRUCTION: &str =
    "Send an email to alice@example.com with subject 'Lunch' saying 'See you at noon'";

fn assert_balanced(driver: &MemoryDriver, result: &ExecutionResult) {
    assert_eq!(
        driver.opened_contexts(),
        driver.closed_contexts(),
        "every context opened for {} must be closed",
        result.task_id
    );
    assert_eq!(driver.open_contexts(), 0);
}

fn step_ids(result: &ExecutionResult) -> Vec<String> {
    result.steps.iter().map(|s| s.step_id.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn gmail_send_succeeds_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(gmail.capability()).build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "{}", result.message);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(result.provider.as_deref(), Some("gmail"));
    assert_eq!(result.auth, Some(AuthOutcome::Authenticated));
    assert!(result.error_kind.is_none());
    assert!(result.artifacts.is_none());

    let task = result.task.as_ref().unwrap();
    assert_eq!(task.intent(), Intent::SendMessage);
    assert_eq!(task.recipients(), ["alice@example.com"]);
    assert_eq!(task.subject(), "Lunch");
    assert_eq!(task.body(), "See you at noon");

    assert_eq!(
        step_ids(&result),
        ["send-1", "send-2", "send-3", "send-4", "send-5", "send-6"]
    );
    assert!(result
        .steps
        .iter()
        .all(|step| step.status == StepStatus::Completed));

    assert_eq!(
        result.states,
        [
            OrchestratorState::Created,
            OrchestratorState::Interpreting,
            OrchestratorState::ProviderSelected,
            OrchestratorState::SessionAcquired,
            OrchestratorState::Authenticating,
            OrchestratorState::Executing,
            OrchestratorState::Succeeded,
            OrchestratorState::SessionReleased,
        ]
    );

    assert_eq!(driver.navigations(), ["https://mail.google.com/mail/"]);
    let typed = driver.interactions_with("textarea[name='to']");
    assert_eq!(typed.len(), 1);
    assert_eq!(
        typed[0].interaction,
        Interaction::Type {
            text: "alice@example.com".to_string()
        }
    );

    // Sign-in and plan attempts all land in the step log, in order.
    let first = result.log.first().unwrap();
    assert_eq!(first.step_id.to_string(), "auth-open");
    assert!(result.log.iter().all(|r| r.task_id == result.task_id));
    assert_eq!(result.log.last().unwrap().step_id.to_string(), "send-6");

    assert_eq!(engine.sessions().acquired(), 1);
    assert_eq!(engine.sessions().released(), 1);
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn outlook_is_used_when_gmail_has_no_credentials() {
    let dir = tempfile::tempdir().unwrap();
    let outlook = OutlookAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(outlook.capability()).build()));
    let mut config = engine_config(dir.path());
    config.providers.remove("gmail");
    let engine = orchestrator(config, driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "{}", result.message);
    assert_eq!(result.provider.as_deref(), Some("outlook"));
    assert_eq!(driver.navigations(), ["https://outlook.live.com/mail/0/"]);

    // The "stay signed in" prompt never showed, so its optional step was skipped.
    let skipped: Vec<&LogRecord> = result
        .log
        .iter()
        .filter(|r| r.outcome == AttemptOutcome::Skipped)
        .collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].step_id.to_string(), "auth-5");
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn request_hint_overrides_the_default() {
    let dir = tempfile::tempdir().unwrap();
    let outlook = OutlookAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(outlook.capability()).build()));
    let mut config = engine_config(dir.path());
    config.default_provider = Some("gmail".into());
    let engine = orchestrator(config, driver.clone());

    let result = engine
        .run(TaskRequest::new(INSTRUCTION).with_provider_hint("Outlook"))
        .await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "{}", result.message);
    assert_eq!(result.provider.as_deref(), Some("outlook"));
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn fallback_selector_is_used_and_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).candidate(roles::RECIPIENT_FIELD, 1);
    let driver = Arc::new(MemoryDriver::new(page.build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "{}", result.message);
    let recipients = &result.steps[1];
    assert_eq!(recipients.label, "fill-recipients");
    assert_eq!(recipients.selector.as_deref(), Some("input[name='to']"));
    assert_eq!(recipients.candidate_index, Some(1));
    assert_eq!(recipients.attempts, 1);

    let logged = result
        .log
        .iter()
        .find(|r| r.step_id.to_string() == "send-2")
        .unwrap();
    assert_eq!(logged.selector.as_deref(), Some("input[name='to']"));
    assert_eq!(driver.interactions_with("input[name='to']").len(), 1);
    assert!(driver.interactions_with("textarea[name='to']").is_empty());
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn missing_send_button_fails_with_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).without(roles::SUBMIT_BUTTON);
    let driver = Arc::new(MemoryDriver::new(page.build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.exit_code(), 1);
    assert_eq!(result.error_kind, Some(ErrorKind::ElementNotFound));
    assert!(result.message.contains("submit-button"), "{}", result.message);
    assert!(
        result.message.ends_with("(after 4 of 6 planned steps)"),
        "{}",
        result.message
    );
    assert_eq!(step_ids(&result), ["send-1", "send-2", "send-3", "send-4"]);
    assert_eq!(result.steps_planned, 6);

    let artifacts = result.artifacts.as_ref().expect("artifacts captured");
    let screenshot = artifacts.screenshot.as_ref().unwrap();
    let snapshot = artifacts.dom_snapshot.as_ref().unwrap();
    assert!(screenshot.exists());
    assert!(snapshot.exists());
    assert!(screenshot.starts_with(dir.path().join("artifacts")));

    assert_eq!(
        result.states[result.states.len() - 2..],
        [OrchestratorState::Failed, OrchestratorState::SessionReleased]
    );
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn page_analysis_finds_a_moved_send_button() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).without(roles::SUBMIT_BUTTON);
    let confirmations = [
        page.selector(roles::SENT_CONFIRMATION).unwrap(),
        page.selector(roles::SENT_FOLDER).unwrap(),
    ];
    let fixture = page
        .build()
        .reveal_on(page.selector(roles::COMPOSE_BUTTON).unwrap(), ["#send-v2"])
        .reveal_on("#send-v2", confirmations);
    let driver = Arc::new(MemoryDriver::new(fixture));

    // The interpreter's call fails over to the rule-based extractor; the
    // selector question gets the fallback reply.
    let llm = Arc::new(MockLlmProvider::replying(r##"{"selectors": ["#send-v2"]}"##));
    llm.push_reply(Err(LlmError::unavailable("interpreter offline")));
    let mut config = engine_config(dir.path());
    config.llm.dom_analysis = true;
    let shared: Arc<dyn LlmProvider> = llm.clone();
    let engine = ExecutionOrchestrator::from_config(config, driver.clone(), Some(shared)).unwrap();

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "{}", result.message);
    let send = &result.steps[4];
    assert_eq!(send.label, "send");
    assert_eq!(send.selector.as_deref(), Some("#send-v2"));
    assert_eq!(driver.interactions_with("#send-v2").len(), 1);

    assert_eq!(llm.calls(), 2);
    let asked = llm.last_request().unwrap();
    assert!(asked
        .instruction
        .contains(&format!("Role: {}", roles::SUBMIT_BUTTON)));
    assert!(asked.instruction.contains("data-selector=\"#send-v2\""));
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn page_analysis_stays_off_unless_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).without(roles::SUBMIT_BUTTON);
    let driver = Arc::new(MemoryDriver::new(page.build()));
    let llm = Arc::new(MockLlmProvider::replying(r##"{"selectors": ["#send-v2"]}"##));
    llm.push_reply(Err(LlmError::unavailable("interpreter offline")));
    let config = engine_config(dir.path());
    let shared: Arc<dyn LlmProvider> = llm.clone();
    let engine = ExecutionOrchestrator::from_config(config, driver.clone(), Some(shared)).unwrap();

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.error_kind, Some(ErrorKind::ElementNotFound));
    assert_eq!(llm.calls(), 1);
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn failure_after_send_is_partial() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).without(roles::SENT_FOLDER);
    let driver = Arc::new(MemoryDriver::new(page.build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::PartiallyFailed);
    assert_eq!(result.exit_code(), 2);
    assert_eq!(result.error_kind, Some(ErrorKind::ElementNotFound));
    assert_eq!(result.steps.len(), 5);
    assert_eq!(result.steps[4].label, "send");
    assert!(result.states.contains(&OrchestratorState::PartiallyFailed));
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn open_mailbox_skips_sign_in() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).signed_in();
    let driver = Arc::new(MemoryDriver::new(page.build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Succeeded, "{}", result.message);
    assert_eq!(result.auth, Some(AuthOutcome::AlreadyAuthenticated));
    assert!(driver.interactions_with("input[type='email']").is_empty());
    let auth_steps: Vec<String> = result
        .log
        .iter()
        .map(|r| r.step_id.to_string())
        .filter(|id| id.starts_with("auth-"))
        .collect();
    assert_eq!(auth_steps, ["auth-open"]);
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn rejected_login_is_an_authentication_failure() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let page = MailPage::new(gmail.capability()).rejecting_login();
    let driver = Arc::new(MemoryDriver::new(page.build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Authentication));
    assert!(result.message.contains("gmail"), "{}", result.message);
    assert!(result.auth.is_none());
    assert!(result.steps.is_empty());
    assert!(!result.states.contains(&OrchestratorState::Executing));
    // Failure screenshot taken from the still-open session.
    assert!(result.artifacts.is_some());
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn broken_browser_context_is_a_session_failure() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(gmail.capability()).build()));
    driver.fail_open(AdapterErrorKind::Launch);
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Session));
    assert_eq!(engine.sessions().acquired(), 0);
    assert_eq!(driver.opened_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn cancelled_request_never_opens_a_session() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(gmail.capability()).build()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = engine
        .run(TaskRequest::new(INSTRUCTION).with_cancel(cancel))
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(driver.opened_contexts(), 0);
    assert_eq!(engine.sessions().acquired(), 0);
}

/// Cancels the task once the given step has succeeded.
struct CancelAfter {
    step: &'static str,
    token: CancellationToken,
}

impl LogSink for CancelAfter {
    fn append(&self, record: &LogRecord) {
        if record.step_id.to_string() == self.step && record.outcome == AttemptOutcome::Succeeded {
            self.token.cancel();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_before_the_next_step() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(gmail.capability()).build()));
    let cancel = CancellationToken::new();
    let engine = orchestrator(engine_config(dir.path()), driver.clone()).with_log_sink(Arc::new(
        CancelAfter {
            step: "send-2",
            token: cancel.clone(),
        },
    ));

    let result = engine
        .run(TaskRequest::new(INSTRUCTION).with_cancel(cancel))
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(step_ids(&result), ["send-1", "send-2"]);
    assert!(driver.interactions_with("input[name='subject']").is_empty());
    assert_eq!(engine.sessions().released(), 1);
    assert_balanced(&driver, &result);
}

#[tokio::test(start_paused = true)]
async fn unreadable_instruction_fails_before_any_session() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(Default::default()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine.run(TaskRequest::new("what a lovely day")).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Interpretation));
    assert!(result.task.is_none());
    assert_eq!(
        result.states,
        [
            OrchestratorState::Created,
            OrchestratorState::Interpreting,
            OrchestratorState::Failed,
        ]
    );
    assert_eq!(driver.opened_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn message_without_recipients_is_rejected_early() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(Default::default()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine
        .run(TaskRequest::new("send an email saying hello there"))
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::Interpretation));
    assert!(result.message.contains("recipients"), "{}", result.message);
    assert!(result.task.is_some());
    assert_eq!(driver.opened_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn unsupported_intent_has_no_provider() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(Default::default()));
    let engine = orchestrator(engine_config(dir.path()), driver.clone());

    let result = engine
        .run(TaskRequest::new("schedule a meeting with the team"))
        .await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error_kind, Some(ErrorKind::NoProviderAvailable));
    assert!(result.provider.is_none());
    assert_eq!(driver.opened_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn no_credentials_means_no_provider() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(Default::default()));
    let mut config = engine_config(dir.path());
    config.providers.clear();
    let engine = orchestrator(config, driver.clone());

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;

    assert_eq!(result.error_kind, Some(ErrorKind::NoProviderAvailable));
    assert!(result.message.contains("available: none"), "{}", result.message);
    assert_eq!(driver.opened_contexts(), 0);
}

#[tokio::test(start_paused = true)]
async fn sessions_stay_balanced_across_outcomes() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let pages = [
        MailPage::new(gmail.capability()).build(),
        MailPage::new(gmail.capability())
            .without(roles::SUBMIT_BUTTON)
            .build(),
        MailPage::new(gmail.capability()).rejecting_login().build(),
        MailPage::new(gmail.capability())
            .without(roles::SENT_FOLDER)
            .build(),
    ];

    let mut statuses = Vec::new();
    for page in pages {
        let driver = Arc::new(MemoryDriver::new(page));
        let engine = orchestrator(engine_config(dir.path()), driver.clone());
        let result = engine.run(TaskRequest::new(INSTRUCTION)).await;
        assert_eq!(engine.sessions().acquired(), engine.sessions().released());
        assert_eq!(engine.sessions().active(), 0);
        assert_balanced(&driver, &result);
        statuses.push(result.status);
    }
    assert_eq!(
        statuses,
        [
            ExecutionStatus::Succeeded,
            ExecutionStatus::Failed,
            ExecutionStatus::Failed,
            ExecutionStatus::PartiallyFailed,
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn result_serializes_for_callers() {
    let dir = tempfile::tempdir().unwrap();
    let gmail = GmailAdapter::new();
    let driver = Arc::new(MemoryDriver::new(MailPage::new(gmail.capability()).build()));
    let engine = orchestrator(engine_config(dir.path()), driver);

    let result = engine.run(TaskRequest::new(INSTRUCTION)).await;
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(json["status"], "succeeded");
    assert_eq!(json["provider"], "gmail");
    assert_eq!(json["task"]["intent"], "send_message");
    assert_eq!(json["states"][0], "created");
    assert_eq!(json["steps"].as_array().unwrap().len(), 6);
}
