use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use taskpilot_core_types::ContextId;

use crate::error::AdapterError;

/// A live element matched by a selector inside one browser context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: String,
    pub selector: String,
    /// Position among the elements the selector matched.
    pub index: usize,
}

/// Interaction performed on a resolved element.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    Click,
    Type { text: String },
    Submit,
}

impl Interaction {
    pub fn name(&self) -> &'static str {
        match self {
            Interaction::Click => "click",
            Interaction::Type { .. } => "type",
            Interaction::Submit => "submit",
        }
    }
}

/// Minimal browser surface the engine drives.
///
/// Every call is scoped to an isolated context: cookies and storage of one
/// context are never visible to another.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open_context(&self) -> Result<ContextId, AdapterError>;

    async fn close_context(&self, context: &ContextId) -> Result<(), AdapterError>;

    async fn navigate(
        &self,
        context: &ContextId,
        url: &str,
        timeout: Duration,
    ) -> Result<(), AdapterError>;

    /// Single, non-waiting lookup. An empty vector means nothing matched yet.
    async fn find_candidates(
        &self,
        context: &ContextId,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, AdapterError>;

    async fn interact(
        &self,
        context: &ContextId,
        element: &ElementHandle,
        interaction: &Interaction,
    ) -> Result<(), AdapterError>;

    async fn current_url(&self, context: &ContextId) -> Result<Option<String>, AdapterError>;

    /// PNG bytes of the current viewport.
    async fn capture_screenshot(&self, context: &ContextId) -> Result<Vec<u8>, AdapterError>;

    /// Serialized DOM of the current page.
    async fn capture_dom_snapshot(&self, context: &ContextId) -> Result<String, AdapterError>;
}
