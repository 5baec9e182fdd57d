//! Selector suggestions read from the live page.
//!
//! When none of a provider's selectors for a role match, the page HTML is
//! handed to the model together with the role and the selectors that
//! already failed, and the model proposes new CSS selectors.

use std::sync::Arc;
use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::LlmError;
use crate::llm_provider::{LlmProvider, LlmRequest};
use crate::utils::extract_json_object;

/// Longest HTML excerpt sent to the model, in characters.
pub const MAX_DOM_CHARS: usize = 8_000;
pub const MAX_SUGGESTIONS: usize = 5;

/// Reply shape for a suggestion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectorSuggestions {
    /// CSS selectors, most reliable first.
    #[serde(default)]
    pub selectors: Vec<String>,
}

pub struct DomAnalyzer {
    llm: Arc<dyn LlmProvider>,
    timeout: Duration,
    response_schema: serde_json::Value,
}

impl DomAnalyzer {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        let response_schema = serde_json::to_value(schema_for!(SelectorSuggestions))
            .unwrap_or(serde_json::Value::Null);
        Self {
            llm,
            timeout: crate::interpreter::DEFAULT_LLM_TIMEOUT,
            response_schema,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.llm.name()
    }

    pub fn request_for(&self, role: &str, tried: &[String], html: &str) -> LlmRequest {
        let tried = if tried.is_empty() {
            "none".to_string()
        } else {
            tried.join("\n")
        };
        LlmRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            instruction: format!(
                "Role: {role}\n\nSelectors that matched nothing:\n{tried}\n\nHTML:\n{}",
                excerpt(html)
            ),
            response_schema: self.response_schema.clone(),
        }
    }

    /// New CSS selectors for `role`, without blanks, XPath or anything in `tried`.
    pub async fn suggest_selectors(
        &self,
        role: &str,
        tried: &[String],
        html: &str,
    ) -> Result<Vec<String>, LlmError> {
        let request = self.request_for(role, tried, html);
        let reply = tokio::time::timeout(self.timeout, self.llm.complete(&request))
            .await
            .map_err(|_| LlmError::Timeout(self.timeout.as_millis() as u64))??;

        let json = extract_json_object(&reply)
            .ok_or_else(|| LlmError::invalid_response("reply contains no JSON object"))?;
        let parsed: SelectorSuggestions = serde_json::from_str(&json).map_err(|err| {
            LlmError::invalid_response(format!("reply is not a selector list: {err}"))
        })?;

        let mut selectors: Vec<String> = Vec::new();
        for selector in parsed.selectors {
            let selector = selector.trim();
            if selector.is_empty()
                || selector.starts_with('/')
                || tried.iter().any(|t| t == selector)
                || selectors.iter().any(|s| s == selector)
            {
                continue;
            }
            selectors.push(selector.to_string());
            if selectors.len() == MAX_SUGGESTIONS {
                break;
            }
        }
        debug!(role, suggested = selectors.len(), "DOM analysis finished");
        Ok(selectors)
    }
}

const SYSTEM_PROMPT: &str = "You analyse a web page's HTML to find one element for automation.\n\
Reply with a single JSON object matching the provided schema and nothing else.\n\
selectors lists CSS selectors for the element with the given role, most reliable first.\n\
Prefer ids, then unique class names, then data attributes, then semantic selectors.\n\
Never repeat a selector that already matched nothing. Do not use XPath.";

fn excerpt(html: &str) -> String {
    match html.char_indices().nth(MAX_DOM_CHARS) {
        Some((cut, _)) => format!("{}...", &html[..cut]),
        None => html.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_provider::MockLlmProvider;

    fn tried() -> Vec<String> {
        vec!["div[role='button'][gh='cm']".to_string()]
    }

    #[test]
    fn long_pages_are_cut() {
        let html = "é".repeat(MAX_DOM_CHARS + 10);
        let cut = excerpt(&html);
        assert_eq!(cut.chars().count(), MAX_DOM_CHARS + 3);
        assert!(cut.ends_with("..."));
        assert_eq!(excerpt("<p>hi</p>"), "<p>hi</p>");
    }

    #[test]
    fn request_names_role_and_failed_selectors() {
        let analyzer = DomAnalyzer::new(Arc::new(MockLlmProvider::new()));
        let request = analyzer.request_for("compose-button", &tried(), "<body></body>");
        assert!(request.instruction.contains("Role: compose-button"));
        assert!(request.instruction.contains("div[role='button'][gh='cm']"));
        assert!(request.instruction.ends_with("<body></body>"));
        assert!(request.response_schema.get("properties").is_some());
    }

    #[tokio::test]
    async fn suggestions_are_cleaned() {
        let llm = Arc::new(MockLlmProvider::replying(
            r##"{"selectors": ["  #compose ", "", "//div[@id='x']", "div[role='button'][gh='cm']", "#compose", "button.new"]}"##,
        ));
        let selectors = DomAnalyzer::new(llm)
            .suggest_selectors("compose-button", &tried(), "<body></body>")
            .await
            .unwrap();
        assert_eq!(selectors, ["#compose", "button.new"]);
    }

    #[tokio::test]
    async fn unusable_replies_are_errors() {
        let llm = Arc::new(MockLlmProvider::replying("no idea, sorry"));
        let err = DomAnalyzer::new(llm)
            .suggest_selectors("send", &[], "<body></body>")
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::InvalidResponse(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_models_time_out() {
        let llm = Arc::new(
            MockLlmProvider::replying(r##"{"selectors": ["#a"]}"##)
                .with_delay(Duration::from_secs(30)),
        );
        let err = DomAnalyzer::new(llm)
            .with_timeout(Duration::from_secs(2))
            .suggest_selectors("send", &[], "")
            .await
            .unwrap_err();
        assert_eq!(err, LlmError::Timeout(2_000));
    }
}
