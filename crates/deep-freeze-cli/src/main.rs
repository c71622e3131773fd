mod commands;
mod logging;
mod progress;

use std::process;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use colored::*;
use commands::{Cli, Commands};
use deep_freeze_core::collab::DefaultCollaborators;
use deep_freeze_core::coordinator::RootOutcome;
use deep_freeze_core::report::relevance_report;
use deep_freeze_core::scanner::Exclusions;
use deep_freeze_core::storage::models::RootStatus;
use deep_freeze_core::storage::{Database, NewClientRoot};
use deep_freeze_core::{AppConfig, Coordinator, PurgeSummary, RunSummary};
use dotenv::dotenv;
use progress::CliReporter;
use tracing::{error, info};

fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let _guard = logging::init_logger();

    let config = match deep_freeze_core::config::load_configuration() {
        Ok(config) => config,
        Err(err) => {
            error!("Error loading configuration: {}", err);
            process::exit(1);
        }
    };

    let args = Cli::parse();

    let command = match args.command {
        Some(command) => command,
        None => {
            let _ = Cli::command().print_long_help();
            return Ok(());
        }
    };

    if let Commands::PrintConfig = command {
        println!("Configuration: {:#?}", config);
        return Ok(());
    }

    if let Err(err) = dispatch(command, config) {
        error!("Error: {:#}", err);
        process::exit(1);
    }

    Ok(())
}

fn dispatch(command: Commands, config: AppConfig) -> anyhow::Result<()> {
    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening {}", config.db_path.display()))?;
    let mut coordinator = Coordinator::new(db, config, DefaultCollaborators);
    let reporter = CliReporter::new();

    match command {
        Commands::Run => {
            let outcomes = coordinator.run_all(&reporter)?;
            if outcomes.is_empty() {
                info!("No client roots to back up");
            }
            for outcome in &outcomes {
                print_run_outcome(outcome);
            }
        }
        Commands::Manual {
            cloud,
            region,
            client,
            root,
        } => {
            let summary = coordinator.run_manual(&cloud, &region, &client, &root, &reporter)?;
            print_run_summary(&format!("{}/{}/{}:{}", cloud, region, client, root), &summary);
        }
        Commands::Purge {
            client: Some(client),
            root: Some(root),
        } => {
            let summary = coordinator.purge(&client, &root, &reporter)?;
            print_purge_summary(&format!("{}:{}", client, root), &summary);
        }
        Commands::Purge { .. } => {
            for outcome in coordinator.purge_all(&reporter)? {
                match &outcome.result {
                    Ok(summary) => print_purge_summary(&outcome.label, summary),
                    Err(err) => println!("{} {}: {}", "✗".red(), outcome.label, err),
                }
            }
        }
        Commands::AddRoot {
            client,
            root,
            key_file,
            bucket,
            cloud,
            region,
            credentials,
        } => {
            let tx = coordinator.database().transaction()?;
            tx.add_client_root(&NewClientRoot {
                client: &client,
                root: &root,
                key_file_path: &key_file,
                cloud: &cloud,
                region: &region,
                credentials: &credentials,
                bucket: &bucket,
            })?;
            tx.commit()?;
            info!("Added client root {}:{}", client, root);
        }
        Commands::SetOption {
            client,
            root,
            key,
            value,
        } => {
            let tx = coordinator.database().transaction()?;
            require_root(tx.get_client_root(&client, &root)?.is_some(), &client, &root)?;
            tx.set_root_option(&client, &root, &key, &value)?;
            tx.commit()?;
            info!("Set {}={} on {}:{}", key, value, client, root);
        }
        Commands::Exclude {
            client,
            root,
            pattern,
        } => {
            Exclusions::compile(std::slice::from_ref(&pattern))?;
            let tx = coordinator.database().transaction()?;
            require_root(tx.get_client_root(&client, &root)?.is_some(), &client, &root)?;
            tx.add_exclusion(&client, &root, &pattern)?;
            tx.commit()?;
            info!("Excluding '{}' under {}:{}", pattern, client, root);
        }
        Commands::SetStatus {
            client,
            root,
            status,
        } => {
            let Some(status) = RootStatus::parse(&status) else {
                bail!("status must be 'active' or 'inactive', got '{}'", status);
            };
            let tx = coordinator.database().transaction()?;
            let changed = tx.set_root_status(&client, &root, status)?;
            tx.commit()?;
            require_root(changed > 0, &client, &root)?;
            info!("{}:{} is now {}", client, root, status);
        }
        Commands::ListRoots => {
            let tx = coordinator.database().transaction()?;
            let roots = tx.list_client_roots()?;
            tx.commit()?;
            for root in roots {
                let status = match root.status {
                    RootStatus::Active => root.status.to_string().green(),
                    RootStatus::Inactive => root.status.to_string().dimmed(),
                };
                println!("{} [{}] bucket={}", root.label().bold(), status, root.bucket);
                println!(
                    "    cross-filesystems={} manual-only={} tmp-dir={}",
                    root.options.cross_filesystems,
                    root.options.manual_only,
                    root.options
                        .tmp_dir
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
                for pattern in &root.exclusions {
                    println!("    exclude {}", pattern);
                }
            }
        }
        Commands::Report { client, root } => {
            let db = coordinator.database();
            let client_root = {
                let tx = db.transaction()?;
                let found = tx.get_client_root(&client, &root)?;
                tx.commit()?;
                found
            };
            let Some(client_root) = client_root else {
                bail!("no client root {}:{}", client, root);
            };
            let report = relevance_report(db, &client_root, Utc::now())?;
            for archive in &report.archives {
                let percent = format!("{:5.1}%", archive.percent_relevant);
                let percent = if archive.relevant_size == 0 {
                    percent.red()
                } else {
                    percent.green()
                };
                println!(
                    "{} {} {}/{} bytes, {} days old",
                    percent,
                    archive.archive_file_name,
                    archive.relevant_size,
                    archive.total_size,
                    archive
                        .age_days
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "?".to_string())
                );
            }
            println!();
            for (bucket, count) in report.histogram.iter().enumerate() {
                println!(
                    "{:>3}-{:<3}% {}",
                    bucket * 10,
                    bucket * 10 + 10,
                    "#".repeat(*count).cyan()
                );
            }
            info!(
                "{} archives, {} fully irrelevant, {} partially relevant",
                report.archives.len(),
                format!("{}", report.fully_irrelevant().count()).red(),
                format!("{}", report.partially_relevant().count()).yellow(),
            );
        }
        Commands::PrintConfig => println!("Configuration: {:#?}", coordinator.config()),
    }

    Ok(())
}

fn require_root(found: bool, client: &str, root: &str) -> anyhow::Result<()> {
    if !found {
        bail!("no client root {}:{}", client, root);
    }
    Ok(())
}

fn print_run_outcome(outcome: &RootOutcome<RunSummary>) {
    match &outcome.result {
        Ok(summary) => print_run_summary(&outcome.label, summary),
        Err(err) => println!("{} {}: {}", "✗".red(), outcome.label, err),
    }
}

fn print_run_summary(label: &str, summary: &RunSummary) {
    println!();
    info!("{} in {}", label.bold(), format!("{:.2}s", summary.duration.as_secs_f64()).green());
    info!(
        "{} files seen, {} vanished, {} flagged for backup",
        format!("{}", summary.sweep.files_seen).cyan(),
        format!("{}", summary.absence.vanished).cyan(),
        format!("{}", summary.files_pending).cyan(),
    );
    info!(
        "{} archives uploaded, {} failed, {} files archived ({} bytes), {} skipped",
        format!("{}", summary.batch.units_uploaded).green(),
        format!("{}", summary.batch.units_failed).red(),
        format!("{}", summary.batch.files_archived).green(),
        summary.batch.bytes_archived,
        format!("{}", summary.batch.files_skipped).yellow(),
    );
}

fn print_purge_summary(label: &str, summary: &PurgeSummary) {
    info!(
        "{}: {} flagged, {} deleted, {} failed",
        label.bold(),
        format!("{}", summary.flagged).cyan(),
        format!("{}", summary.deleted).green(),
        format!("{}", summary.failed).red(),
    );
}
