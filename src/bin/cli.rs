//! subsidy-crawl CLI
//!
//! Local execution entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use subsidy_crawl::{
    adapter::HttpTableFactory,
    error::Result,
    models::Config,
    pipeline::{run_crawl, CarrierHandle, ShutdownSignal},
    storage::{CheckpointStore, JsonCheckpointStore},
};

/// subsidy-crawl - Device Subsidy Disclosure Crawler
#[derive(Parser, Debug)]
#[command(
    name = "subsidy-crawl",
    version,
    about = "Collects device-subsidy disclosure tables from telecom retail sites"
)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Directory for collected output
    #[arg(short, long, default_value = "data")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Crawl all configured carriers
    Crawl {
        /// Only crawl these carriers (default: all with an adapter)
        #[arg(long)]
        carrier: Vec<String>,

        /// Ignore any existing checkpoint and start fresh
        #[arg(long)]
        fresh: bool,
    },

    /// Validate the configuration file
    Validate,

    /// Show checkpoint status
    Info,

    /// Remove a leftover checkpoint
    ClearCheckpoint,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Build a session factory for every carrier that has one available.
fn build_carriers(config: &Config, only: &[String]) -> Vec<CarrierHandle> {
    let mut handles = Vec::new();
    for carrier in &config.carriers {
        if !only.is_empty() && !only.contains(&carrier.name) {
            continue;
        }
        match &carrier.site {
            Some(profile) => {
                let factory =
                    HttpTableFactory::new(&carrier.name, profile.clone(), &config.crawler);
                handles.push(CarrierHandle::new(carrier.clone(), Arc::new(factory)));
            }
            None => {
                log::warn!(
                    "{}: no site profile configured and no external adapter wired in, skipping",
                    carrier.name
                );
            }
        }
    }
    handles
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Config::load_or_default(&cli.config);
    let store = JsonCheckpointStore::new(&config.checkpoint.path);

    match cli.command {
        Command::Crawl { carrier, fresh } => {
            config.validate()?;

            if fresh {
                store.clear().await?;
                log::info!("existing checkpoint discarded");
            }

            let carriers = build_carriers(&config, &carrier);
            if carriers.is_empty() {
                log::error!("no runnable carriers; check the config's site profiles");
                return Err(subsidy_crawl::error::AppError::config(
                    "no runnable carriers",
                ));
            }

            // Ctrl-C stops dispatch; in-flight tasks drain and a final
            // checkpoint is flushed before exit
            let shutdown = ShutdownSignal::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    log::warn!("interrupt received, finishing in-flight tasks");
                    signal.trigger();
                }
            });

            let outcome = run_crawl(&config, &carriers, &store, &shutdown).await?;

            tokio::fs::create_dir_all(&cli.data_dir).await?;
            let stamp = outcome.summary.started_at.format("%Y%m%d_%H%M%S");
            let output = cli.data_dir.join(format!("subsidies_{stamp}.json"));
            let json = serde_json::to_vec_pretty(&outcome.records)?;
            tokio::fs::write(&output, json).await?;
            log::info!(
                "{} records written to {}",
                outcome.records.len(),
                output.display()
            );

            let summary_path = cli.data_dir.join(format!("summary_{stamp}.json"));
            let json = serde_json::to_vec_pretty(&outcome.summary)?;
            tokio::fs::write(&summary_path, json).await?;
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {e}");
                return Err(e);
            }
            let with_adapter = config.carriers.iter().filter(|c| c.site.is_some()).count();
            log::info!(
                "Config OK: {} carriers, {} with an HTTP site profile",
                config.carriers.len(),
                with_adapter
            );
        }

        Command::Info => {
            log::info!("Checkpoint path: {}", config.checkpoint.path.display());
            match store.load().await? {
                Some(checkpoint) => {
                    log::info!("Checkpoint saved at: {}", checkpoint.saved_at);
                    log::info!("Resume cursor: {:?}", checkpoint.last_completed_index);
                    log::info!("Records held: {}", checkpoint.records.len());
                }
                None => log::info!("No usable checkpoint found."),
            }
        }

        Command::ClearCheckpoint => {
            store.clear().await?;
            log::info!("Checkpoint cleared.");
        }
    }

    Ok(())
}
