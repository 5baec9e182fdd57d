//! Click primitive

use cdp_adapter::{ElementHandle, Interaction};
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::interact_bounded,
    session::Session,
    types::{ActionReport, ExecCtx},
};

pub async fn execute_click(
    session: &Session,
    ctx: &ExecCtx,
    element: &ElementHandle,
) -> Result<ActionReport, ActionError> {
    info!(
        action_id = %ctx.action_id,
        selector = %element.selector,
        "Executing click primitive"
    );
    interact_bounded(session, ctx, element, Interaction::Click).await
}
