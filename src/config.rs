//! Engine configuration
//!
//! Layers, lowest priority first: built-in defaults, an optional YAML file,
//! `TASKPILOT__`-prefixed environment variables, the well-known credential
//! variables (`GMAIL_EMAIL`, `OPENAI_API_KEY`, ...) and finally CLI flags.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use action_flow::RetryPolicy;
use cdp_adapter::CdpConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::EngineError;

const ENV_PREFIX: &str = "TASKPILOT";

/// Well-known variables and the `(provider, key)` they fill in.
const CREDENTIAL_ENV: &[(&str, &str, &str)] = &[
    ("GMAIL_EMAIL", "gmail", "email"),
    ("GMAIL_PASSWORD", "gmail", "password"),
    ("OUTLOOK_EMAIL", "outlook", "email"),
    ("OUTLOOK_PASSWORD", "outlook", "password"),
];

/// Credential values for one provider. Debug output never shows values.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(BTreeMap<String, String>);

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Value for `key`, treating blank values as missing.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.0.keys()).finish()
    }
}

#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Ask the model for selectors when a page matches none of the known ones.
    pub dom_analysis: bool,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            api_base: "https://api.openai.com/v1".to_string(),
            temperature: 0.1,
            timeout_secs: 20,
            dom_analysis: false,
        }
    }
}

impl fmt::Debug for LlmSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .field("dom_analysis", &self.dom_analysis)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    /// Also write logs to this file when set.
    pub file: Option<PathBuf>,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub providers: BTreeMap<String, Credentials>,
    pub headless: bool,
    /// Overall task deadline.
    pub timeout_secs: u64,
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Wait per selector candidate.
    pub selector_timeout_ms: u64,
    pub default_provider: Option<String>,
    pub artifacts_dir: PathBuf,
    pub capture_on_error: bool,
    pub chrome_executable: Option<PathBuf>,
    pub llm: LlmSettings,
    pub log: LogSettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            headless: true,
            timeout_secs: 120,
            retry_attempts: 3,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 4_000,
            selector_timeout_ms: 5_000,
            default_provider: None,
            artifacts_dir: PathBuf::from("artifacts"),
            capture_on_error: true,
            chrome_executable: None,
            llm: LlmSettings::default(),
            log: LogSettings::default(),
        }
    }
}

/// Values taken from command-line flags.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub headless: Option<bool>,
    pub timeout_secs: Option<u64>,
    pub retry_attempts: Option<u32>,
    pub default_provider: Option<String>,
    pub log_file: Option<PathBuf>,
    pub dom_analysis: Option<bool>,
}

impl EngineConfig {
    pub fn load(path: Option<&Path>) -> Result<Self, EngineError> {
        let mut loader = ConfigLoader::new();
        if let Some(path) = path {
            loader = loader.with_file(path);
        } else if let Some(path) = default_config_path() {
            loader = loader.with_optional_file(path);
        }
        loader.load()
    }

    /// Fill credentials and the LLM key from the well-known variables.
    ///
    /// A well-known variable wins over the same value from a file or from
    /// `TASKPILOT__` variables.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (var, provider, key) in CREDENTIAL_ENV {
            if let Some(value) = lookup(var).filter(|v| !v.trim().is_empty()) {
                debug!(var, provider, "credential taken from environment");
                self.providers
                    .entry((*provider).to_string())
                    .or_default()
                    .insert(*key, value);
            }
        }
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty()) {
            self.llm.api_key = Some(key);
        }
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(headless) = overrides.headless {
            self.headless = headless;
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(attempts) = overrides.retry_attempts {
            self.retry_attempts = attempts;
        }
        if let Some(provider) = &overrides.default_provider {
            self.default_provider = Some(provider.clone());
        }
        if let Some(file) = &overrides.log_file {
            self.log.file = Some(file.clone());
        }
        if let Some(enabled) = overrides.dom_analysis {
            self.llm.dom_analysis = enabled;
        }
    }

    /// Reject settings the engine cannot run with.
    pub fn validate<S: AsRef<str>>(&self, registered: &[S]) -> Result<(), EngineError> {
        if self.retry_attempts == 0 {
            return Err(EngineError::config("retry_attempts must be at least 1"));
        }
        if self.timeout_secs == 0 {
            return Err(EngineError::config("timeout_secs must be positive"));
        }
        if self.selector_timeout_ms == 0 {
            return Err(EngineError::config("selector_timeout_ms must be positive"));
        }
        if self.llm.timeout_secs == 0 {
            return Err(EngineError::config("llm.timeout_secs must be positive"));
        }
        if self.retry_max_delay_ms < self.retry_base_delay_ms {
            return Err(EngineError::config(
                "retry_max_delay_ms must not be below retry_base_delay_ms",
            ));
        }
        if let Some(default) = &self.default_provider {
            let default = default.to_ascii_lowercase();
            if !registered.iter().any(|name| name.as_ref() == default) {
                return Err(EngineError::config(format!(
                    "default_provider '{default}' is not a registered provider"
                )));
            }
        }
        Ok(())
    }

    pub fn credentials_for(&self, provider: &str) -> Credentials {
        self.providers
            .get(&provider.to_ascii_lowercase())
            .cloned()
            .unwrap_or_default()
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_attempts,
            Duration::from_millis(self.retry_base_delay_ms),
            Duration::from_millis(self.retry_max_delay_ms),
        )
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn selector_timeout(&self) -> Duration {
        Duration::from_millis(self.selector_timeout_ms)
    }

    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    pub fn cdp_config(&self) -> CdpConfig {
        let mut cdp = CdpConfig::default().with_headless(self.headless);
        if let Some(executable) = &self.chrome_executable {
            cdp.executable = executable.clone();
        }
        cdp
    }
}

/// `./config/taskpilot.yaml` if present, else the per-user config file.
pub fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from("config/taskpilot.yaml");
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir().map(|dir| dir.join("taskpilot").join("config.yaml"))
}

/// Builds an [`EngineConfig`] from the layered sources.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<(PathBuf, bool)>,
    env_prefix: String,
    well_known_env: bool,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            file: None,
            env_prefix: ENV_PREFIX.to_string(),
            well_known_env: true,
        }
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// File that must exist.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some((path.into(), true));
        self
    }

    /// File that is read only if it exists.
    pub fn with_optional_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some((path.into(), false));
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    pub fn without_well_known_env(mut self) -> Self {
        self.well_known_env = false;
        self
    }

    pub fn load(&self) -> Result<EngineConfig, EngineError> {
        let defaults = config::Config::try_from(&EngineConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some((path, required)) = &self.file {
            if *required || path.exists() {
                info!(path = %path.display(), "Loading configuration file");
                builder = builder.add_source(
                    config::File::from(path.as_path())
                        .format(config::FileFormat::Yaml)
                        .required(*required),
                );
            } else {
                debug!(path = %path.display(), "No configuration file, using defaults");
            }
        }

        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let mut loaded: EngineConfig = builder.build()?.try_deserialize()?;
        if self.well_known_env {
            loaded.apply_env_with(|key| std::env::var(key).ok());
        }
        loaded.providers = loaded
            .providers
            .into_iter()
            .map(|(name, credentials)| (name.to_ascii_lowercase(), credentials))
            .collect();
        Ok(loaded)
    }
}
