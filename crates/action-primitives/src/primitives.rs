//! Action primitives implementation
//!
//! Core primitives the executor composes into steps:
//! 1. navigate - Load a URL in the session's context
//! 2. click - Click a resolved element
//! 3. type_text - Focus a resolved element and type into it
//! 4. submit - Activate a submit control

mod click;
mod navigate;
mod submit;
mod type_text;

pub use click::*;
pub use navigate::*;
pub use submit::*;
pub use type_text::*;

use cdp_adapter::{ElementHandle, Interaction};
use chrono::Utc;
use tracing::debug;

use crate::{
    errors::ActionError,
    session::Session,
    types::{ActionReport, ExecCtx},
};

/// Shared body of the element primitives: context check, bounded driver
/// call, report.
pub(crate) async fn interact_bounded(
    session: &Session,
    ctx: &ExecCtx,
    element: &ElementHandle,
    interaction: Interaction,
) -> Result<ActionReport, ActionError> {
    let started_at = Utc::now();
    let start_instant = tokio::time::Instant::now();
    ctx.check()?;

    debug!(
        action_id = %ctx.action_id,
        selector = %element.selector,
        interaction = interaction.name(),
        "Executing interaction"
    );
    let call = session
        .driver()
        .interact(session.context(), element, &interaction);
    match tokio::time::timeout(ctx.remaining_time(), call).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(ActionError::DeadlineExceeded(format!(
                "{} on '{}'",
                interaction.name(),
                element.selector
            )))
        }
    }

    let latency_ms = start_instant.elapsed().as_millis() as u64;
    Ok(ActionReport::success(started_at, latency_ms).with_selector(element.selector.clone()))
}
