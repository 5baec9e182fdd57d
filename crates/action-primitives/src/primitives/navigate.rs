//! Navigate primitive - Load a URL in the session's browser context

use crate::{
    errors::ActionError,
    session::Session,
    types::{ActionReport, ExecCtx},
};
use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, info};

/// Execute navigate primitive
///
/// The driver waits for the load itself; the wait is bounded by what is
/// left of the context deadline.
pub async fn execute_navigate(
    session: &Session,
    ctx: &ExecCtx,
    url: &str,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = Instant::now();

    info!(
        action_id = %ctx.action_id,
        url = %url,
        "Executing navigate primitive"
    );

    if url.is_empty() {
        return Err(ActionError::InvalidStep("URL cannot be empty".to_string()));
    }
    if !url.starts_with("http://")
        && !url.starts_with("https://")
        && !url.starts_with("file://")
        && !url.starts_with("about:")
    {
        return Err(ActionError::InvalidStep(format!("Invalid URL scheme: {}", url)));
    }

    ctx.check()?;

    debug!("Issuing navigate");
    session
        .driver()
        .navigate(session.context(), url, ctx.remaining_time())
        .await?;

    let url_after = session.driver().current_url(session.context()).await?;
    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success(started_at, latency_ms).with_url(url_after))
}
