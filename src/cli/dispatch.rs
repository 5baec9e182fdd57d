use anyhow::Result;

use super::env::CliArgs;
use super::{cmd_interpret, cmd_providers, cmd_run};
use crate::cli::commands::Commands;
use crate::cli::context::CliContext;

/// Runs the chosen command and returns the process exit code.
pub async fn dispatch(cli: &CliArgs, ctx: &CliContext) -> Result<u8> {
    match cli.command.clone() {
        Commands::Run(args) => cmd_run(args, ctx).await,
        Commands::Interpret(args) => cmd_interpret(args, ctx).await.map(|_| 0),
        Commands::Providers => cmd_providers(ctx).map(|_| 0),
    }
}
