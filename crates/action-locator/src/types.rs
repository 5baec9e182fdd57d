//! Core types for locator system

use cdp_adapter::ElementHandle;
use serde::{Deserialize, Serialize};

/// Successful element resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub role: String,
    pub element: ElementHandle,

    /// Selector that matched
    pub selector: String,

    /// Position of the selector in the query's own candidate list; learned
    /// selectors count on from the end of that list
    pub candidate_index: usize,

    /// Whether the selector was tried first because of session bias
    pub from_bias: bool,

    /// Whether the selector came from page analysis instead of the query
    #[serde(default)]
    pub suggested: bool,

    /// Time spent waiting across all candidates
    pub waited_ms: u64,
}

impl Resolution {
    /// True when the primary selector did not match and a later one did.
    pub fn used_fallback(&self) -> bool {
        self.candidate_index > 0
    }
}
