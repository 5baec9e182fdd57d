//! Element resolution with ordered selector fallback
//!
//! A semantic role maps to an ordered list of CSS selectors. The resolver:
//! - tries the session's previously successful selector first
//! - polls each candidate with a growing interval up to its own timeout
//! - records the winning selector as the session's new preference
//! - optionally asks a [`SelectorAdvisor`] for more selectors read from the page
//! - captures a screenshot and DOM snapshot when every candidate fails

pub mod errors;
pub mod resolver;
pub mod types;

pub use errors::*;
pub use resolver::*;
pub use types::*;
