//! Instruction interpretation for TaskPilot.
//!
//! Turns a natural-language instruction into a [`StructuredTask`]. The
//! [`InstructionInterpreter`] asks an [`LlmProvider`] first and falls back to
//! the [`RuleBasedExtractor`] when the model is unavailable, slow, or replies
//! with something unusable.
//!
//! [`DomAnalyzer`] asks the same provider for replacement selectors when a
//! page no longer matches the known ones.

pub mod dom_analysis;
pub mod errors;
pub mod interpreter;
pub mod llm_provider;
pub mod model;
pub mod rule_based;
pub mod utils;

pub use dom_analysis::{DomAnalyzer, SelectorSuggestions, MAX_DOM_CHARS, MAX_SUGGESTIONS};
pub use errors::{InterpretError, LlmError};
pub use interpreter::{
    validate_draft, InstructionInterpreter, DEFAULT_LLM_CONFIDENCE, DEFAULT_LLM_TIMEOUT,
    MIN_LLM_CONFIDENCE,
};
pub use llm_provider::{LlmProvider, LlmRequest, MockLlmProvider};
pub use model::{Intent, InterpretationSource, RecipientList, StructuredTask, TaskDraft};
pub use rule_based::{generate_subject, RuleBasedExtractor, DEFAULT_SUBJECT};
pub use utils::extract_json_object;
