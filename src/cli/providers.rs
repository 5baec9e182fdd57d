use anyhow::Result;

use super::context::CliContext;
use super::output::{render_providers, ProviderRow};
use crate::providers::ProviderRegistry;

pub fn cmd_providers(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    let registry = ProviderRegistry::with_builtin(config.selector_timeout())?;
    registry.set_default(config.default_provider.clone());
    let availability = registry.availability(config);
    let default = registry.default_provider();

    let rows: Vec<ProviderRow> = registry
        .providers()
        .iter()
        .map(|adapter| {
            let capability = adapter.capability();
            ProviderRow {
                name: adapter.name().to_string(),
                intents: capability.intents().map(|i| i.to_string()).collect(),
                available: availability.contains(adapter.name()),
                missing_credentials: capability
                    .missing_credentials(&config.credentials_for(adapter.name())),
                default: default.as_deref() == Some(adapter.name()),
            }
        })
        .collect();

    print!("{}", render_providers(&rows, ctx.output())?);
    Ok(())
}
