use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use super::context::CliContext;
use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::{load_config, LoadedConfig};
use crate::telemetry::init_logging;

pub async fn run() -> Result<u8> {
    let cli = CliArgs::parse();

    // Logging settings may come from the file, so it is read first.
    let LoadedConfig { mut config, path } = load_config(cli.config.as_deref())?;
    if let Some(file) = &cli.log_file {
        config.log.file = Some(file.clone());
    }
    let level = cli.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    let _telemetry = init_logging(&level, cli.debug, config.log.file.as_deref())?;

    info!("Starting TaskPilot v{}", env!("CARGO_PKG_VERSION"));
    if let Some(path) = &path {
        info!(path = %path.display(), "Configuration loaded");
    }

    let cli_context = CliContext::new(config, path, cli.output);
    match dispatch(&cli, &cli_context).await {
        Ok(code) => {
            info!(code, "Command completed");
            Ok(code)
        }
        Err(err) => {
            error!("Command failed: {}", err);
            Err(err)
        }
    }
}
