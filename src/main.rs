//! torrent-quota CLI entry point.
//!
//! With no subcommand, runs one accounting cycle (the scheduled job).
//! `force-start` starts every torrent regardless of usage; `status` prints
//! the month's usage from the ledger.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use torrent_quota::config::Config;
use torrent_quota::controller::{self, CycleContext, CycleError};
use torrent_quota::logging::{self, LoggingGuard};
use torrent_quota::runner;
use torrent_quota::transport::transmission::TransmissionClient;
use torrent_quota::usage::calendar::BYTES_PER_GIB;
use torrent_quota::usage::ledger::LedgerStore;
use torrent_quota::usage::limits::headroom_gib;

/// Transfer cap enforcement for a Transmission torrent client.
#[derive(Parser)]
#[command(name = "torrent-quota", version, about)]
struct Cli {
    /// Subcommand to execute; defaults to `run`.
    #[command(subcommand)]
    command: Option<Command>,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Run one accounting cycle (default).
    Run,
    /// Start every torrent and enable autostart, ignoring usage.
    ForceStart,
    /// Print this month's usage and caps from the ledger.
    Status,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            logging::init_cli("info");
            error!(error = %format!("{e:#}"), "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    let _logging_guard = init_logging(&config);

    let result = match cli.command.unwrap_or(Command::Run) {
        Command::Run => handle_run(&config).await,
        Command::ForceStart => handle_force_start(&config).await,
        Command::Status => handle_status(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{e:#}"), "torrent-quota failed");
            ExitCode::FAILURE
        }
    }
}

/// Install the log subscriber, with a file sink when `logging.dir` is set.
fn init_logging(config: &Config) -> Option<LoggingGuard> {
    let Some(dir) = &config.logging.dir else {
        logging::init_cli(&config.logging.level);
        return None;
    };
    match logging::init_production(dir, &config.logging.level) {
        Ok(guard) => Some(guard),
        Err(e) => {
            logging::init_cli(&config.logging.level);
            warn!(error = %e, "file logging unavailable, logging to stderr only");
            None
        }
    }
}

/// Run one accounting cycle.
async fn handle_run(config: &Config) -> anyhow::Result<()> {
    let ctx = CycleContext::new(chrono::Utc::now(), config)?;
    let store = LedgerStore::new(config.ledger_path()?);

    let result = runner::run_scheduled(&store, &ctx, || {
        TransmissionClient::connect(&config.transmission)
    })
    .await;

    match result {
        Ok(report) => {
            info!(
                state = ?report.state,
                active = report.active_torrents,
                delta = ?report.delta,
                usage_this_month = report.usage_this_month,
                reannounce_failures = report.reannounce_failures,
                "cycle complete"
            );
            Ok(())
        }
        Err(e @ CycleError::AnomalousZeroUsage { .. }) => {
            info!(reason = %e, "cycle ended early");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Start every torrent and enable autostart.
async fn handle_force_start(config: &Config) -> anyhow::Result<()> {
    let client = TransmissionClient::connect(&config.transmission)
        .await
        .with_context(|| format!("failed to connect to {}", config.transmission.rpc_url()))?;
    controller::force_start(&client)
        .await
        .context("failed to start torrents")?;
    Ok(())
}

/// Print the month's usage without touching the client or the ledger.
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let ctx = CycleContext::new(chrono::Utc::now(), config)?;
    let store = LedgerStore::new(config.ledger_path()?);
    let status = runner::usage_status(&store, &ctx)
        .with_context(|| format!("failed to read ledger at {}", store.path().display()))?;

    println!(
        "Accounting day {:04}-{:02}-{:02}",
        ctx.date.year, ctx.date.month, ctx.date.day
    );
    println!("  used today:        {:.2} GiB", gib(status.usage_today));
    println!("  used this month:   {:.2} GiB", gib(status.usage_this_month));
    println!(
        "  daily cap:         {:.2} GiB ({:.2} GiB remaining)",
        gib(status.daily_cap_bytes),
        headroom_gib(status.daily_cap_bytes, status.usage_this_month)
    );
    println!(
        "  monthly cap:       {:.2} GiB ({:.2} GiB remaining)",
        gib(status.monthly_cap_bytes),
        headroom_gib(status.monthly_cap_bytes, status.usage_this_month)
    );
    println!("  last counter:      {} bytes", status.last_observed_counter);
    Ok(())
}

fn gib(bytes: u64) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    {
        bytes as f64 / BYTES_PER_GIB as f64
    }
}
