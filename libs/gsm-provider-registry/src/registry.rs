use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use gsm_core::{SharedMessageStore, SharedTrackingIds};

use crate::config::ProvidersConfig;
use crate::provider::{ProviderContext, SharedProvider};
use crate::providers::log::LogProvider;

/// Builds a provider from its context. Runs at most once per name.
pub type ProviderFactory =
    Arc<dyn Fn(ProviderContext) -> anyhow::Result<SharedProvider> + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum RegistryError {
    #[error("provider `{0}` already registered")]
    AlreadyRegistered(String),
    #[error("provider `{0}` is not enabled")]
    ProviderDisabled(String),
    #[error("provider `{0}` has no implementation")]
    ProviderNotImplemented(String),
    #[error("provider `{name}` violates its contract: {reason}")]
    ContractViolation { name: String, reason: String },
    #[error("no provider name given and no default provider configured")]
    NoDefaultProvider,
}

impl RegistryError {
    pub fn code(&self) -> &'static str {
        match self {
            RegistryError::AlreadyRegistered(_) => "already_registered",
            RegistryError::ProviderDisabled(_) => "provider_disabled",
            RegistryError::ProviderNotImplemented(_) => "provider_not_implemented",
            RegistryError::ContractViolation { .. } => "contract_violation",
            RegistryError::NoDefaultProvider => "no_default_provider",
        }
    }
}

/// Name -> factory table plus a cache of built providers.
pub struct ProviderRegistry {
    config: Arc<ProvidersConfig>,
    store: SharedMessageStore,
    tracking: SharedTrackingIds,
    factories: HashMap<String, ProviderFactory>,
    cache: DashMap<String, SharedProvider>,
}

impl ProviderRegistry {
    pub fn new(
        config: impl Into<Arc<ProvidersConfig>>,
        store: SharedMessageStore,
        tracking: SharedTrackingIds,
    ) -> Self {
        Self {
            config: config.into(),
            store,
            tracking,
            factories: HashMap::new(),
            cache: DashMap::new(),
        }
    }

    /// Registry with the built-in providers already registered.
    pub fn with_builtins(
        config: impl Into<Arc<ProvidersConfig>>,
        store: SharedMessageStore,
        tracking: SharedTrackingIds,
    ) -> Self {
        let mut registry = Self::new(config, store, tracking);
        registry.factories.insert(LogProvider::NAME.into(), LogProvider::factory());
        registry
    }

    pub fn register(
        &mut self,
        name: impl AsRef<str>,
        factory: ProviderFactory,
    ) -> Result<(), RegistryError> {
        let key = normalize(name.as_ref());
        if self.factories.contains_key(&key) {
            return Err(RegistryError::AlreadyRegistered(key));
        }
        self.factories.insert(key, factory);
        Ok(())
    }

    /// Convenience wrapper around [`ProviderRegistry::register`] for closures.
    pub fn register_fn<F>(&mut self, name: impl AsRef<str>, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(ProviderContext) -> anyhow::Result<SharedProvider> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(factory))
    }

    pub fn config(&self) -> &ProvidersConfig {
        &self.config
    }

    pub fn store(&self) -> &SharedMessageStore {
        &self.store
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize(name))
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.config.default_provider()
    }

    /// Enabled provider names, sorted.
    pub fn available_providers(&self) -> BTreeSet<String> {
        self.config.enabled_providers()
    }

    /// Resolves `name`, or the configured default when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<SharedProvider, RegistryError> {
        let key = match name {
            Some(name) => normalize(name),
            None => self
                .config
                .default_provider()
                .map(normalize)
                .ok_or(RegistryError::NoDefaultProvider)?,
        };
        let settings = match self.config.provider(&key) {
            Some(settings) if settings.enabled => settings,
            _ => return Err(RegistryError::ProviderDisabled(key)),
        };

        match self.cache.entry(key) {
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                let key = entry.key().clone();
                let factory = self
                    .factories
                    .get(&key)
                    .ok_or_else(|| RegistryError::ProviderNotImplemented(key.clone()))?;
                let ctx = ProviderContext::new(
                    settings,
                    Arc::clone(&self.store),
                    Arc::clone(&self.tracking),
                );
                let provider = factory(ctx).map_err(|err| RegistryError::ContractViolation {
                    name: key.clone(),
                    reason: format!("factory failed: {err:#}"),
                })?;
                if provider.name() != key {
                    return Err(RegistryError::ContractViolation {
                        name: key.clone(),
                        reason: format!("built provider reports name `{}`", provider.name()),
                    });
                }
                if let Some(declared) = settings.contact_type
                    && provider.contact_type() != declared
                {
                    return Err(RegistryError::ContractViolation {
                        name: key.clone(),
                        reason: format!(
                            "config declares contact type `{declared}` but provider uses `{}`",
                            provider.contact_type()
                        ),
                    });
                }
                tracing::info!(
                    provider = %key,
                    contact_type = %provider.contact_type(),
                    "provider loaded"
                );
                entry.insert(Arc::clone(&provider));
                Ok(provider)
            }
        }
    }

    /// Resolves every enabled provider, in name order.
    pub fn resolve_available(&self) -> Vec<(String, Result<SharedProvider, RegistryError>)> {
        self.available_providers()
            .into_iter()
            .map(|name| {
                let resolved = self.resolve(Some(&name));
                (name, resolved)
            })
            .collect()
    }

    /// Enabled providers that can be polled, plus the names that failed to
    /// resolve.
    pub fn polling_providers(&self) -> PollingProviders {
        let mut polling = PollingProviders::default();
        for (name, resolved) in self.resolve_available() {
            match resolved {
                Ok(provider) if provider.supports_polling() => polling.providers.push(provider),
                Ok(_) => {}
                Err(err) => polling.unresolved.push((name, err)),
            }
        }
        polling
    }
}

/// Result of [`ProviderRegistry::polling_providers`].
#[derive(Default)]
pub struct PollingProviders {
    pub providers: Vec<SharedProvider>,
    pub unresolved: Vec<(String, RegistryError)>,
}

fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderSettings;
    use crate::testkit::RecordingHandle;
    use gsm_core::{ContactType, HostTrackingIds, InMemoryMessageStore};

    fn registry(config: ProvidersConfig) -> ProviderRegistry {
        ProviderRegistry::new(
            config,
            InMemoryMessageStore::shared(),
            HostTrackingIds::new("test", "1").shared(),
        )
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut reg = registry(ProvidersConfig::new());
        let handle = RecordingHandle::new();
        reg.register("SMS", handle.factory()).unwrap();
        let err = reg.register("sms", handle.factory()).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyRegistered(name) if name == "sms"));
    }

    #[test]
    fn disabled_and_unknown_names_fail_before_factory() {
        let config = ProvidersConfig::new().with_provider(ProviderSettings::new("sms").disabled());
        let mut reg = registry(config);
        let handle = RecordingHandle::new();
        reg.register("sms", handle.factory()).unwrap();

        assert!(matches!(
            reg.resolve(Some("sms")),
            Err(RegistryError::ProviderDisabled(_))
        ));
        assert!(matches!(
            reg.resolve(Some("pigeon")),
            Err(RegistryError::ProviderDisabled(_))
        ));
        assert_eq!(handle.builds(), 0);
    }

    #[test]
    fn enabled_without_factory_is_not_implemented() {
        let reg = registry(ProvidersConfig::new().with_provider(ProviderSettings::new("fax")));
        assert!(matches!(
            reg.resolve(Some("fax")),
            Err(RegistryError::ProviderNotImplemented(_))
        ));
    }

    #[test]
    fn resolve_is_case_insensitive_and_cached() {
        let config = ProvidersConfig::new()
            .with_provider(ProviderSettings::new("sms").with_from("12345"))
            .with_default_provider("SMS");
        let mut reg = registry(config);
        let handle = RecordingHandle::new();
        reg.register("sms", handle.factory()).unwrap();

        let a = reg.resolve(Some("SmS")).unwrap();
        let b = reg.resolve(None).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.name(), "sms");
        assert_eq!(a.from(), "12345");
        assert_eq!(handle.builds(), 1);
    }

    #[test]
    fn missing_default_is_reported() {
        let reg = registry(ProvidersConfig::new());
        assert!(matches!(reg.resolve(None), Err(RegistryError::NoDefaultProvider)));
    }

    #[test]
    fn contact_type_mismatch_is_a_contract_violation() {
        let config = ProvidersConfig::new()
            .with_provider(ProviderSettings::new("email").with_contact_type(ContactType::Email));
        let mut reg = registry(config);
        let handle = RecordingHandle::new().with_contact_type(ContactType::Sms);
        reg.register("email", handle.factory()).unwrap();
        let Err(err) = reg.resolve(Some("email")) else {
            panic!("expected contract violation");
        };
        assert!(matches!(err, RegistryError::ContractViolation { .. }));
        assert_eq!(err.code(), "contract_violation");
    }

    #[test]
    fn failing_factory_is_a_contract_violation() {
        let mut reg = registry(ProvidersConfig::new().with_provider(ProviderSettings::new("smtp")));
        reg.register_fn("smtp", |_ctx| anyhow::bail!("smtp_host option missing"))
            .unwrap();
        match reg.resolve(Some("smtp")) {
            Err(RegistryError::ContractViolation { reason, .. }) => {
                assert!(reason.contains("smtp_host"));
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected contract violation"),
        }
    }

    #[test]
    fn polling_providers_report_unresolved_names() {
        let config = ProvidersConfig::new()
            .with_provider(ProviderSettings::new("twitter"))
            .with_provider(ProviderSettings::new("sms"))
            .with_provider(ProviderSettings::new("fax"));
        let mut reg = registry(config);
        reg.register("twitter", crate::testkit::ScriptedInbox::new().factory())
            .unwrap();
        reg.register("sms", RecordingHandle::new().factory()).unwrap();

        let polling = reg.polling_providers();
        assert_eq!(polling.providers.len(), 1);
        assert_eq!(polling.providers[0].name(), "twitter");
        assert_eq!(polling.unresolved.len(), 1);
        assert_eq!(polling.unresolved[0].0, "fax");
        assert_eq!(polling.unresolved[0].1.code(), "provider_not_implemented");
    }

    #[test]
    fn builtins_include_log() {
        let reg = ProviderRegistry::with_builtins(
            ProvidersConfig::new().with_provider(ProviderSettings::new("log")),
            InMemoryMessageStore::shared(),
            HostTrackingIds::new("test", "1").shared(),
        );
        assert!(reg.is_registered("LOG"));
        assert_eq!(reg.resolve(Some("log")).unwrap().name(), "log");
    }
}
