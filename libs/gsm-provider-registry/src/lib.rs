//! Provider configuration, the provider capability trait, and the registry
//! that turns configured names into live providers.

pub mod config;
pub mod provider;
pub mod providers;
pub mod registry;

#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub use config::{ConfigError, DispatchSettings, ProviderSettings, ProvidersConfig};
pub use provider::{Provider, ProviderContext, SharedProvider, receive_batch};
pub use providers::log::LogProvider;
pub use registry::{PollingProviders, ProviderFactory, ProviderRegistry, RegistryError};
