//! TaskPilot task execution engine
//!
//! Takes a natural-language instruction, picks a web service that can carry
//! it out, signs in with a real browser and runs the steps. Exposes the
//! engine modules for the binary and for integration testing.

pub mod cli;
pub mod config;
pub mod errors;
pub mod llm;
pub mod orchestrator;
pub mod providers;
pub mod sessions;
pub mod telemetry;

pub use config::{ConfigLoader, ConfigOverrides, Credentials, EngineConfig};
pub use errors::{EngineError, ErrorKind};
pub use llm::{LlmSelectorAdvisor, OpenAiConfig, OpenAiLlmProvider};
pub use orchestrator::{
    ExecutionOrchestrator, ExecutionResult, ExecutionStatus, OrchestratorState, TaskRequest,
};
pub use providers::{
    AuthOutcome, Availability, GmailAdapter, IntentOutcome, OutlookAdapter, ProviderAdapter,
    ProviderCapability, ProviderRegistry, TaskCtx,
};
pub use sessions::{SessionLease, SessionManager};
