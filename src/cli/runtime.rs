use std::path::{Path, PathBuf};
use std::sync::Arc;

use agent_core::LlmProvider;
use anyhow::{Context, Result};
use tracing::warn;

use crate::config::{default_config_path, ConfigLoader, EngineConfig};
use crate::llm::{OpenAiConfig, OpenAiLlmProvider};

pub struct LoadedConfig {
    pub config: EngineConfig,
    pub path: Option<PathBuf>,
}

/// An explicit path must exist; otherwise the default location is optional.
pub fn load_config(path: Option<&Path>) -> Result<LoadedConfig> {
    let (loader, path) = match path {
        Some(path) => (ConfigLoader::new().with_file(path), Some(path.to_path_buf())),
        None => match default_config_path() {
            Some(default) => {
                let found = default.exists().then(|| default.clone());
                (ConfigLoader::new().with_optional_file(default), found)
            }
            None => (ConfigLoader::new(), None),
        },
    };
    let config = loader.load().context("Failed to load configuration")?;
    Ok(LoadedConfig { config, path })
}

/// The configured model, or `None` to interpret with rules only.
pub fn build_llm(config: &EngineConfig) -> Option<Arc<dyn LlmProvider>> {
    let settings = OpenAiConfig::from_settings(&config.llm)?;
    match OpenAiLlmProvider::new(settings) {
        Ok(provider) => Some(Arc::new(provider)),
        Err(err) => {
            warn!(%err, "LLM client unavailable, using rule-based interpretation");
            None
        }
    }
}
