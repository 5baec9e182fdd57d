use std::sync::Arc;

use anyhow::{Context, Result};
use cdp_adapter::ChromiumDriver;
use clap::Args;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::context::CliContext;
use super::output::render_result;
use super::runtime::build_llm;
use crate::config::ConfigOverrides;
use crate::orchestrator::{ExecutionOrchestrator, TaskRequest};

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Instruction to carry out, e.g. "email bob@example.com saying hi"
    pub instruction: String,

    /// Provider to use, overriding the instruction and the configured default
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Run the browser without a window
    #[arg(long, conflicts_with = "headed")]
    pub headless: bool,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Overall task timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Attempts per step
    #[arg(long)]
    pub retries: Option<u32>,

    /// Let the LLM suggest selectors when a page matches none of the known ones
    #[arg(long)]
    pub dom_analysis: bool,
}

impl RunArgs {
    fn overrides(&self) -> ConfigOverrides {
        let headless = match (self.headless, self.headed) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        };
        ConfigOverrides {
            headless,
            timeout_secs: self.timeout,
            retry_attempts: self.retries,
            dom_analysis: self.dom_analysis.then_some(true),
            ..ConfigOverrides::default()
        }
    }
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext) -> Result<u8> {
    let mut config = ctx.config().clone();
    config.apply_overrides(&args.overrides());
    let llm = build_llm(&config);

    let driver = Arc::new(
        ChromiumDriver::launch(&config.cdp_config())
            .await
            .context("Failed to launch browser")?,
    );
    let orchestrator = match ExecutionOrchestrator::from_config(config, driver.clone(), llm) {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            driver.shutdown().await;
            return Err(err.into());
        }
    };

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, cancelling task");
                cancel.cancel();
            }
        })
    };

    let mut request = TaskRequest::new(args.instruction).with_cancel(cancel);
    if let Some(provider) = args.provider {
        request = request.with_provider_hint(provider);
    }
    let result = orchestrator.run(request).await;

    interrupt.abort();
    driver.shutdown().await;

    print!("{}", render_result(&result, ctx.output())?);
    Ok(u8::try_from(result.exit_code()).unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> RunArgs {
        RunArgs {
            instruction: "email a@b.com".into(),
            provider: None,
            headless: false,
            headed: false,
            timeout: None,
            retries: None,
            dom_analysis: false,
        }
    }

    #[test]
    fn flags_become_overrides() {
        let overrides = args().overrides();
        assert_eq!(overrides.headless, None);
        assert_eq!(overrides.dom_analysis, None);

        let headed = RunArgs {
            headed: true,
            timeout: Some(30),
            retries: Some(5),
            dom_analysis: true,
            ..args()
        };
        let overrides = headed.overrides();
        assert_eq!(overrides.headless, Some(false));
        assert_eq!(overrides.timeout_secs, Some(30));
        assert_eq!(overrides.retry_attempts, Some(5));
        assert_eq!(overrides.dom_analysis, Some(true));
    }
}
