use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use gsm_dispatch::{DispatchReport, FetchReport};
use gsm_dispatcher::{Cli, Commands, build_coordinator, load_config, open_store, provider_rows};
use serde::Serialize;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    gsm_telemetry::install("gsm-dispatcher")?;

    let config = load_config(&cli)?;
    let store = open_store(cli.store.as_deref())?;
    let coordinator = build_coordinator(config, store);

    match cli.command {
        Commands::Providers => {
            let rows = provider_rows(coordinator.registry());
            if cli.json {
                print_json(&rows)?;
            } else if rows.is_empty() {
                println!("No providers configured");
            } else {
                println!(
                    "{:<16} {:<8} {:<8} {:<11} {:<8} FROM",
                    "NAME", "ENABLED", "DEFAULT", "REGISTERED", "TYPE"
                );
                for row in rows {
                    println!(
                        "{:<16} {:<8} {:<8} {:<11} {:<8} {}",
                        row.name,
                        row.enabled,
                        row.default,
                        row.registered,
                        row.contact_type.as_deref().unwrap_or("-"),
                        row.from
                    );
                }
            }
        }
        Commands::Process { provider, limit } => {
            let report = coordinator
                .process_pending_messages(limit, provider.as_deref())
                .await?;
            if cli.json {
                print_json(&report)?;
            } else {
                print_dispatch(&report);
            }
        }
        Commands::Fetch { limit } => {
            let report = coordinator.fetch_all(limit).await;
            if cli.json {
                print_json(&report)?;
            } else {
                print_fetch(&report);
            }
        }
        Commands::Queue {
            to,
            body,
            title,
            provider,
        } => {
            let message = coordinator
                .queue_outbound(provider.as_deref(), &to, &body, title.as_deref())
                .await?;
            if cli.json {
                print_json(&message)?;
            } else {
                println!(
                    "Queued message {} for {} via {}",
                    message.id, message.to, message.provider
                );
            }
        }
        Commands::Run {
            interval_secs,
            limit,
        } => {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
            tracing::info!(interval_secs, "dispatcher running");
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        tracing::info!("interrupted, shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        match coordinator.run_cycle(limit).await {
                            Ok(report) if cli.json => print_json(&report)?,
                            Ok(report) => {
                                print_fetch(&report.fetch);
                                print_dispatch(&report.dispatch);
                            }
                            Err(err) => {
                                tracing::error!(code = err.code(), error = %err, "cycle failed");
                            }
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_dispatch(report: &DispatchReport) {
    println!(
        "claimed={} sent={} delivered={} failed={} requeued={} unrecorded={}",
        report.claimed,
        report.sent,
        report.delivered,
        report.failed,
        report.requeued,
        report.unrecorded
    );
    for failure in &report.failures {
        println!(
            "  message {} ({}): {} {}",
            failure.message_id, failure.provider, failure.code, failure.error
        );
    }
    for skipped in &report.skipped {
        println!("  skipped {}: {}", skipped.provider, skipped.error);
    }
}

fn print_fetch(report: &FetchReport) {
    println!("fetched={}", report.fetched);
    for (provider, count) in &report.per_provider {
        println!("  {provider}: {count}");
    }
    for err in &report.errors {
        println!("  {} failed: {}", err.provider, err.error);
    }
}
