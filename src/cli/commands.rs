use clap::Subcommand;

use super::interpret::InterpretArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Carry out an instruction in the browser
    Run(RunArgs),

    /// Show how an instruction would be interpreted, without a browser
    Interpret(InterpretArgs),

    /// List registered providers and whether they have credentials
    Providers,
}
