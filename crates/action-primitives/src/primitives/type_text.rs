//! Type text primitive - Type text into input fields and editors

use cdp_adapter::{ElementHandle, Interaction};
use tracing::info;

use crate::{
    errors::ActionError,
    primitives::interact_bounded,
    session::Session,
    types::{ActionReport, ExecCtx},
};

/// Typed text is never logged, only its length.
pub async fn execute_type_text(
    session: &Session,
    ctx: &ExecCtx,
    element: &ElementHandle,
    text: &str,
) -> Result<ActionReport, ActionError> {
    info!(
        action_id = %ctx.action_id,
        selector = %element.selector,
        text_length = text.len(),
        "Executing type_text primitive"
    );
    interact_bounded(
        session,
        ctx,
        element,
        Interaction::Type {
            text: text.to_string(),
        },
    )
    .await
}
