use agent_core::InstructionInterpreter;
use anyhow::Result;
use clap::Args;

use super::context::CliContext;
use super::output::render_task;
use super::runtime::build_llm;
use crate::errors::EngineError;
use crate::providers::ProviderRegistry;

#[derive(Args, Clone, Debug)]
pub struct InterpretArgs {
    /// Instruction to interpret
    pub instruction: String,

    /// Use the rule-based extractor even if a model is configured
    #[arg(long)]
    pub rules_only: bool,
}

pub async fn cmd_interpret(args: InterpretArgs, ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let names = ProviderRegistry::with_builtin(config.selector_timeout())?.names();
    let mut interpreter = InstructionInterpreter::new(&names).with_timeout(config.llm_timeout());
    if !args.rules_only {
        if let Some(llm) = build_llm(config) {
            interpreter = interpreter.with_llm(llm);
        }
    }

    let task = interpreter
        .interpret(&args.instruction)
        .await
        .map_err(EngineError::from)?;
    print!("{}", render_task(&task, ctx.output())?);
    Ok(())
}
