//! Action primitives - the data model and browser operations for UI work
//!
//! This crate provides the building blocks the locator and executor share:
//! - element queries with ordered fallback selectors
//! - action steps (navigate, click, type, submit)
//! - sessions with per-session selector bias and artifact storage
//! - the four interaction primitives and their error taxonomy

pub mod artifacts;
pub mod errors;
mod primitives;
pub mod session;
pub mod types;
mod waiting;

pub use artifacts::*;
pub use errors::*;
pub use primitives::*;
pub use session::*;
pub use types::*;
pub use waiting::*;
