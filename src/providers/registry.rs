//! Provider registry and selection

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use agent_core::{Intent, StructuredTask};
use parking_lot::RwLock;
use tracing::debug;

use super::{GmailAdapter, OutlookAdapter, ProviderAdapter};
use crate::config::EngineConfig;
use crate::errors::EngineError;

/// Providers the engine may use right now: those with complete credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Availability {
    available: BTreeSet<String>,
}

impl Availability {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            available: names
                .into_iter()
                .map(|name| name.as_ref().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.available.contains(&name.to_ascii_lowercase())
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.available.iter().map(String::as_str)
    }
}

/// Registered providers in registration order.
pub struct ProviderRegistry {
    providers: RwLock<Vec<Arc<dyn ProviderAdapter>>>,
    default_provider: RwLock<Option<String>>,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            default_provider: RwLock::new(None),
        }
    }

    /// Gmail then Outlook, both using `selector_timeout` per candidate.
    pub fn with_builtin(selector_timeout: Duration) -> Result<Self, EngineError> {
        Self::with_adapters([
            Arc::new(GmailAdapter::new().with_selector_timeout(selector_timeout))
                as Arc<dyn ProviderAdapter>,
            Arc::new(OutlookAdapter::new().with_selector_timeout(selector_timeout)),
        ])
    }

    /// Registers `adapters` in order; the first rejected one fails the whole set.
    pub fn with_adapters<I>(adapters: I) -> Result<Self, EngineError>
    where
        I: IntoIterator<Item = Arc<dyn ProviderAdapter>>,
    {
        let registry = Self::new();
        for adapter in adapters {
            registry.register(adapter)?;
        }
        Ok(registry)
    }

    pub fn register(&self, adapter: Arc<dyn ProviderAdapter>) -> Result<(), EngineError> {
        adapter.capability().validate()?;
        let mut providers = self.providers.write();
        if providers.iter().any(|p| p.name() == adapter.name()) {
            return Err(EngineError::config(format!(
                "provider '{}' is already registered",
                adapter.name()
            )));
        }
        debug!(provider = adapter.name(), "Registered provider");
        providers.push(adapter);
        Ok(())
    }

    pub fn set_default(&self, provider: Option<String>) {
        *self.default_provider.write() = provider.map(|p| p.to_ascii_lowercase());
    }

    pub fn default_provider(&self) -> Option<String> {
        self.default_provider.read().clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        let name = name.to_ascii_lowercase();
        self.providers
            .read()
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.providers
            .read()
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    pub fn providers(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }

    /// Registered providers whose required credentials are all configured.
    pub fn availability(&self, config: &EngineConfig) -> Availability {
        Availability::new(
            self.providers
                .read()
                .iter()
                .filter(|p| p.capability().has_credentials(&config.credentials_for(p.name())))
                .map(|p| p.name().to_string()),
        )
    }

    /// Pick the provider for `task` using its own hint.
    pub fn select(
        &self,
        task: &StructuredTask,
        availability: &Availability,
    ) -> Result<Arc<dyn ProviderAdapter>, EngineError> {
        self.select_for(task.intent(), task.provider_hint(), availability)
    }

    /// Hint first, then the configured default, then registration order.
    /// Only available providers that support `intent` qualify.
    pub fn select_for(
        &self,
        intent: Intent,
        hint: Option<&str>,
        availability: &Availability,
    ) -> Result<Arc<dyn ProviderAdapter>, EngineError> {
        let providers = self.providers.read();
        let usable = |adapter: &&Arc<dyn ProviderAdapter>| {
            availability.contains(adapter.name()) && adapter.capability().supports(intent)
        };
        let named = |name: &str| {
            let name = name.to_ascii_lowercase();
            providers.iter().filter(usable).find(|p| p.name() == name).cloned()
        };

        if let Some(hint) = hint {
            if let Some(adapter) = named(hint) {
                debug!(provider = adapter.name(), "Selected hinted provider");
                return Ok(adapter);
            }
            debug!(hint, "Hinted provider not usable, falling back");
        }
        if let Some(default) = self.default_provider.read().as_deref() {
            if let Some(adapter) = named(default) {
                debug!(provider = adapter.name(), "Selected default provider");
                return Ok(adapter);
            }
        }
        if let Some(adapter) = providers.iter().find(usable) {
            debug!(provider = adapter.name(), "Selected first capable provider");
            return Ok(Arc::clone(adapter));
        }

        Err(EngineError::no_provider(format!(
            "no available provider supports {intent} (registered: {}; available: {})",
            join_or_none(providers.iter().map(|p| p.name())),
            join_or_none(availability.names()),
        )))
    }
}

fn join_or_none<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let joined = names.collect::<Vec<_>>().join(", ");
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined
    }
}
