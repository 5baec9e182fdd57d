//! Engine-side session: one isolated browser context plus the state that is
//! scoped to it (selector bias and artifacts).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cdp_adapter::BrowserDriver;
use taskpilot_core_types::{ContextId, SessionId, TaskId};

use crate::artifacts::{ArtifactStore, Artifacts};
use crate::types::ElementQuery;

/// Candidate selector in the order it should be tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedCandidate {
    pub selector: String,
    /// Position in the query's own candidate list. Learned selectors are
    /// numbered after the query's last candidate.
    pub original_index: usize,
    pub from_bias: bool,
    /// Came from page analysis rather than the query.
    pub learned: bool,
}

/// Per-session memory of which selector last worked for each role.
#[derive(Debug, Clone, Default)]
pub struct SelectorBias {
    preferred: HashMap<String, Vec<String>>,
    learned: HashMap<String, Vec<String>>,
}

impl SelectorBias {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn preferred(&self, role: &str) -> &[String] {
        self.preferred.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn learned(&self, role: &str) -> &[String] {
        self.learned.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Move `selector` to the front of the role's preference list.
    pub fn promote(&mut self, role: &str, selector: &str) {
        let list = self.preferred.entry(role.to_string()).or_default();
        list.retain(|known| known != selector);
        list.insert(0, selector.to_string());
    }

    /// Remember a selector found outside the query's candidates and prefer it.
    pub fn learn(&mut self, role: &str, selector: &str) {
        let list = self.learned.entry(role.to_string()).or_default();
        if !list.iter().any(|known| known == selector) {
            list.push(selector.to_string());
        }
        self.promote(role, selector);
    }

    /// Biased selectors first, then the remaining candidates in query order.
    ///
    /// Preferences are only honoured for selectors the query lists or that
    /// were learned for the role.
    pub fn order(&self, query: &ElementQuery) -> Vec<OrderedCandidate> {
        let candidates = query.candidates();
        let learned = self.learned(query.role());
        let mut ordered: Vec<OrderedCandidate> = Vec::with_capacity(candidates.len());
        for selector in self.preferred(query.role()) {
            let (index, is_learned) = match candidates.iter().position(|c| c == selector) {
                Some(index) => (index, false),
                None => match learned.iter().position(|l| l == selector) {
                    Some(position) => (candidates.len() + position, true),
                    None => continue,
                },
            };
            ordered.push(OrderedCandidate {
                selector: selector.clone(),
                original_index: index,
                from_bias: true,
                learned: is_learned,
            });
        }
        for (index, selector) in candidates.iter().enumerate() {
            if ordered.iter().any(|o| &o.selector == selector) {
                continue;
            }
            ordered.push(OrderedCandidate {
                selector: selector.clone(),
                original_index: index,
                from_bias: false,
                learned: false,
            });
        }
        ordered
    }
}

pub struct Session {
    id: SessionId,
    task_id: TaskId,
    context: ContextId,
    driver: Arc<dyn BrowserDriver>,
    bias: SelectorBias,
    artifacts: ArtifactStore,
}

impl Session {
    pub fn new(
        task_id: TaskId,
        context: ContextId,
        driver: Arc<dyn BrowserDriver>,
        artifacts: ArtifactStore,
    ) -> Self {
        Self {
            id: SessionId::new(),
            task_id,
            context,
            driver,
            bias: SelectorBias::new(),
            artifacts,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn driver(&self) -> &dyn BrowserDriver {
        self.driver.as_ref()
    }

    pub fn driver_handle(&self) -> Arc<dyn BrowserDriver> {
        Arc::clone(&self.driver)
    }

    pub fn bias(&self) -> &SelectorBias {
        &self.bias
    }

    pub fn bias_mut(&mut self) -> &mut SelectorBias {
        &mut self.bias
    }

    pub fn artifact_store(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub async fn capture_artifacts(&self, label: &str) -> Artifacts {
        self.artifacts
            .capture(self.driver.as_ref(), &self.context, label)
            .await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("task_id", &self.task_id)
            .field("context", &self.context)
            .field("driver", &self.driver.name())
            .finish()
    }
}
