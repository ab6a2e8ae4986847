//! Provider configuration loaded from YAML.
//!
//! ```yaml
//! default_provider: log
//! providers:
//!   log: { enabled: true, from: "gateway", contact_type: sms }
//!   email: { enabled: false, from: "ops@example.com", contact_type: email, smtp_host: "..." }
//! dispatch:
//!   default_limit: 20
//!   call_timeout_ms: 30000
//!   max_attempts: 1
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use gsm_core::ContactType;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CONFIG_PATH_ENV: &str = "DATA_PROVIDER_CONFIG";
pub const DEFAULT_PROVIDER_ENV: &str = "DATA_PROVIDER_DEFAULT";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read provider config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse provider config: {0}")]
    Parse(#[from] serde_yaml_bw::Error),
    #[error("provider `{0}` is configured more than once (names are case-insensitive)")]
    DuplicateProvider(String),
    #[error("provider `{provider}` declares unknown contact type `{value}`")]
    UnknownContactType { provider: String, value: String },
}

/// Settings applied to every dispatch cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub default_limit: usize,
    pub call_timeout_ms: u64,
    pub max_attempts: u32,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            default_limit: 20,
            call_timeout_ms: 30_000,
            max_attempts: 1,
        }
    }
}

impl DispatchSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// One provider entry. Keys other than `enabled`, `from` and `contact_type`
/// end up in `options`.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub name: String,
    pub enabled: bool,
    pub from: String,
    pub contact_type: Option<ContactType>,
    pub options: Map<String, Value>,
}

impl ProviderSettings {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().to_lowercase(),
            enabled: true,
            from: String::new(),
            contact_type: None,
            options: Map::new(),
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn with_contact_type(mut self, contact_type: ContactType) -> Self {
        self.contact_type = Some(contact_type);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    #[serde(default = "default_enabled")]
    enabled: bool,
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    contact_type: Option<String>,
    #[serde(flatten)]
    options: Map<String, Value>,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    default_provider: Option<String>,
    #[serde(default)]
    providers: BTreeMap<String, Option<RawProvider>>,
    #[serde(default)]
    dispatch: Option<DispatchSettings>,
}

/// Full provider configuration. Passed explicitly to the registry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    default_provider: Option<String>,
    providers: BTreeMap<String, ProviderSettings>,
    pub dispatch: DispatchSettings,
}

impl ProvidersConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        let raw: RawConfig = serde_yaml_bw::from_str(raw)?;
        let mut providers = BTreeMap::new();
        for (key, entry) in raw.providers {
            let name = key.trim().to_lowercase();
            if providers.contains_key(&name) {
                return Err(ConfigError::DuplicateProvider(name));
            }
            let settings = match entry {
                Some(entry) => settings_from_raw(&name, entry)?,
                None => ProviderSettings::new(&name),
            };
            providers.insert(name, settings);
        }
        Ok(Self {
            default_provider: raw
                .default_provider
                .map(|name| name.trim().to_lowercase())
                .filter(|name| !name.is_empty()),
            providers,
            dispatch: raw.dispatch.unwrap_or_default(),
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Like [`ProvidersConfig::from_path`], but a missing file yields an empty config.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(
                path = %path.display(),
                "provider config not found, using empty config"
            );
            return Ok(Self::default());
        }
        Self::from_path(path)
    }

    /// Reads the file named by `DATA_PROVIDER_CONFIG` and applies
    /// `DATA_PROVIDER_DEFAULT` on top.
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let default_provider = std::env::var(DEFAULT_PROVIDER_ENV).ok();
        Self::load(path.as_deref(), default_provider.as_deref())
    }

    /// Loads `path` (empty config when absent or missing) and lets a non-blank
    /// `default_provider` override the file's default.
    pub fn load(path: Option<&Path>, default_provider: Option<&str>) -> Result<Self, ConfigError> {
        let config = match path.filter(|p| !p.as_os_str().is_empty()) {
            Some(path) => Self::load_or_default(path)?,
            None => Self::default(),
        };
        Ok(match default_provider.filter(|d| !d.trim().is_empty()) {
            Some(name) => config.with_default_provider(name),
            None => config,
        })
    }

    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into().trim().to_lowercase());
        self
    }

    pub fn with_provider(mut self, settings: ProviderSettings) -> Self {
        self.providers.insert(settings.name.clone(), settings);
        self
    }

    pub fn with_dispatch(mut self, dispatch: DispatchSettings) -> Self {
        self.dispatch = dispatch;
        self
    }

    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider.as_deref()
    }

    /// Case-insensitive lookup.
    pub fn provider(&self, name: &str) -> Option<&ProviderSettings> {
        self.providers.get(&name.trim().to_lowercase())
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.provider(name).is_some_and(|p| p.enabled)
    }

    pub fn enabled_providers(&self) -> BTreeSet<String> {
        self.providers
            .values()
            .filter(|p| p.enabled)
            .map(|p| p.name.clone())
            .collect()
    }

    pub fn providers(&self) -> impl Iterator<Item = &ProviderSettings> {
        self.providers.values()
    }
}

fn settings_from_raw(name: &str, raw: RawProvider) -> Result<ProviderSettings, ConfigError> {
    let contact_type = raw
        .contact_type
        .map(|value| {
            value
                .parse::<ContactType>()
                .map_err(|_| ConfigError::UnknownContactType {
                    provider: name.to_string(),
                    value,
                })
        })
        .transpose()?;
    Ok(ProviderSettings {
        name: name.to_string(),
        enabled: raw.enabled,
        from: raw.from.unwrap_or_default(),
        contact_type,
        options: raw.options,
    })
}
