//! Selector suggestions from the configured LLM.

use action_locator::{LocatorError, SelectorAdvisor};
use agent_core::DomAnalyzer;
use async_trait::async_trait;

/// Lets the element resolver ask the LLM about pages whose markup changed.
pub struct LlmSelectorAdvisor {
    analyzer: DomAnalyzer,
}

impl LlmSelectorAdvisor {
    pub fn new(analyzer: DomAnalyzer) -> Self {
        Self { analyzer }
    }
}

#[async_trait]
impl SelectorAdvisor for LlmSelectorAdvisor {
    fn name(&self) -> &str {
        self.analyzer.provider_name()
    }

    async fn suggest(
        &self,
        role: &str,
        tried: &[String],
        dom: &str,
    ) -> Result<Vec<String>, LocatorError> {
        self.analyzer
            .suggest_selectors(role, tried, dom)
            .await
            .map_err(|err| LocatorError::Advisor(err.to_string()))
    }
}
