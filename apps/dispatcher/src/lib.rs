//! Wiring shared by the `gsm-dispatcher` binary and its tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gsm_core::{HostTrackingIds, InMemoryMessageStore, SharedMessageStore, sqlite_store};
use gsm_dispatch::DispatchCoordinator;
use gsm_provider_registry::{ProviderRegistry, ProvidersConfig};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(author, version, about = "Messaging gateway dispatcher")]
pub struct Cli {
    /// Provider config file (YAML)
    #[arg(long, global = true, env = "DATA_PROVIDER_CONFIG")]
    pub config: Option<PathBuf>,
    /// Default provider, overriding the config file
    #[arg(long, global = true, env = "DATA_PROVIDER_DEFAULT")]
    pub default_provider: Option<String>,
    /// SQLite message store; in-memory when omitted
    #[arg(long, global = true, env = "DATA_PROVIDER_STORE")]
    pub store: Option<PathBuf>,
    /// Emit JSON output
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List configured providers
    Providers,
    /// Run one send cycle
    Process {
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run one fetch cycle over polling providers
    Fetch {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Queue an outbound message
    Queue {
        #[arg(long)]
        to: String,
        #[arg(long)]
        body: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        provider: Option<String>,
    },
    /// Fetch and send on an interval until interrupted
    Run {
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
        #[arg(long)]
        limit: Option<usize>,
    },
}

/// One row of `providers` output.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ProviderRow {
    pub name: String,
    pub enabled: bool,
    pub default: bool,
    pub registered: bool,
    pub contact_type: Option<String>,
    pub from: String,
}

pub fn load_config(cli: &Cli) -> Result<ProvidersConfig> {
    ProvidersConfig::load(cli.config.as_deref(), cli.default_provider.as_deref())
        .context("load provider config")
}

pub fn open_store(path: Option<&Path>) -> Result<SharedMessageStore> {
    match path {
        Some(path) => {
            sqlite_store(path).with_context(|| format!("open message store {}", path.display()))
        }
        None => {
            tracing::warn!("no --store given, messages live only for this run");
            Ok(InMemoryMessageStore::shared())
        }
    }
}

pub fn build_coordinator(
    config: ProvidersConfig,
    store: SharedMessageStore,
) -> DispatchCoordinator {
    let registry =
        ProviderRegistry::with_builtins(config, store, HostTrackingIds::from_system().shared());
    DispatchCoordinator::new(Arc::new(registry))
}

pub fn provider_rows(registry: &ProviderRegistry) -> Vec<ProviderRow> {
    let default = registry.default_provider();
    registry
        .config()
        .providers()
        .map(|settings| ProviderRow {
            name: settings.name.clone(),
            enabled: settings.enabled,
            default: default == Some(settings.name.as_str()),
            registered: registry.is_registered(&settings.name),
            contact_type: settings.contact_type.map(|c| c.to_string()),
            from: settings.from.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gsm-dispatcher",
            "process",
            "--provider",
            "log",
            "--limit",
            "5",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        match cli.command {
            Commands::Process { provider, limit } => {
                assert_eq!(provider.as_deref(), Some("log"));
                assert_eq!(limit, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn queue_requires_recipient_and_body() {
        assert!(Cli::try_parse_from(["gsm-dispatcher", "queue", "--to", "x"]).is_err());
    }

    #[test]
    fn run_interval_defaults_to_thirty_seconds() {
        let cli = Cli::try_parse_from(["gsm-dispatcher", "run"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Run {
                interval_secs: 30,
                limit: None
            }
        ));
    }
}
