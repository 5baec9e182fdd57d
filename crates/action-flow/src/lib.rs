//! Step execution layer
//!
//! Runs one [`ActionStep`](action_primitives::ActionStep) at a time against a
//! session: resolve the target, perform the interaction, retry retryable
//! failures with capped exponential backoff, and append every attempt to the
//! task's [`StepLog`].

pub mod executor;
pub mod log;
pub mod strategies;
pub mod types;

pub use executor::{ActionExecutor, DefaultActionExecutor};
pub use log::{LogSink, MemorySink, StepLog, TracingSink};
pub use strategies::RetryPolicy;
pub use types::{AttemptOutcome, LogRecord, StepOutcome, StepStatus};
