use std::sync::Arc;
use std::time::Duration;

use action_primitives::{
    execute_click, execute_navigate, execute_submit, execute_type_text, ActionError,
    ArtifactStore, ExecCtx, Session,
};
use cdp_adapter::{AdapterErrorKind, BrowserDriver, DomFixture, Interaction, MemoryDriver};
use taskpilot_core_types::TaskId;
use tokio_util::sync::CancellationToken;

async fn session(driver: Arc<MemoryDriver>, dir: &std::path::Path) -> Session {
    let context = driver.open_context().await.unwrap();
    Session::new(TaskId::new(), context, driver, ArtifactStore::new(dir))
}

fn ctx() -> ExecCtx {
    ExecCtx::with_timeout(Duration::from_secs(5), CancellationToken::new())
}

#[tokio::test]
async fn navigate_records_url() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(DomFixture::new()));
    let session = session(driver.clone(), dir.path()).await;

    let report = execute_navigate(&session, &ctx(), "https://mail.example/inbox")
        .await
        .unwrap();
    assert!(report.finished_at >= report.started_at);
    assert_eq!(report.url_after.as_deref(), Some("https://mail.example/inbox"));
    assert_eq!(driver.navigations(), vec!["https://mail.example/inbox"]);
}

#[tokio::test]
async fn navigate_rejects_unknown_scheme() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(DomFixture::new()));
    let session = session(driver.clone(), dir.path()).await;
    let err = tokio_test::assert_err!(execute_navigate(&session, &ctx(), "ftp://x").await);
    assert!(matches!(err, ActionError::InvalidStep(_)));
    assert!(driver.navigations().is_empty());
}

#[tokio::test]
async fn element_primitives_drive_the_driver() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(
        DomFixture::new()
            .with_element("#to")
            .with_element("#send"),
    ));
    let session = session(driver.clone(), dir.path()).await;
    let to = driver
        .find_candidates(session.context(), "#to")
        .await
        .unwrap()
        .remove(0);
    let send = driver
        .find_candidates(session.context(), "#send")
        .await
        .unwrap()
        .remove(0);

    tokio_test::assert_ok!(execute_click(&session, &ctx(), &to).await);
    let typed = execute_type_text(&session, &ctx(), &to, "a@b.com")
        .await
        .unwrap();
    assert_eq!(typed.selector.as_deref(), Some("#to"));
    execute_submit(&session, &ctx(), &send).await.unwrap();

    let kinds: Vec<Interaction> = driver
        .interactions()
        .into_iter()
        .map(|r| r.interaction)
        .collect();
    assert_eq!(
        kinds,
        vec![
            Interaction::Click,
            Interaction::Type {
                text: "a@b.com".into()
            },
            Interaction::Submit
        ]
    );
}

#[tokio::test]
async fn driver_faults_map_to_action_errors() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(DomFixture::new().with_element("#send")));
    let session = session(driver.clone(), dir.path()).await;
    let send = driver
        .find_candidates(session.context(), "#send")
        .await
        .unwrap()
        .remove(0);

    driver.fail_interaction("#send", AdapterErrorKind::NotInteractable, 1);
    let err = execute_submit(&session, &ctx(), &send).await.unwrap_err();
    assert!(matches!(err, ActionError::NotClickable(_)));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn cancelled_context_stops_before_the_driver() {
    let dir = tempfile::tempdir().unwrap();
    let driver = Arc::new(MemoryDriver::new(DomFixture::new().with_element("#send")));
    let session = session(driver.clone(), dir.path()).await;
    let send = driver
        .find_candidates(session.context(), "#send")
        .await
        .unwrap()
        .remove(0);

    let token = CancellationToken::new();
    token.cancel();
    let ctx = ExecCtx::with_timeout(Duration::from_secs(5), token);
    let err = execute_click(&session, &ctx, &send).await.unwrap_err();
    assert!(matches!(err, ActionError::Interrupted(_)));
    assert!(driver.interactions().is_empty());
}
