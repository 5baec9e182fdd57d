pub mod app;
pub mod commands;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod interpret;
pub mod output;
pub mod providers;
pub mod run;
pub mod runtime;

pub use interpret::{cmd_interpret, InterpretArgs};
pub use providers::cmd_providers;
pub use run::{cmd_run, RunArgs};
