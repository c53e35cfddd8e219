//! CLI entry point for the Atlas discovery engine.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use atlas_inventory::InventoryStore;

use atlas_discover::config::DiscoverConfig;
use atlas_discover::{Probes, ScanMode, ScanOrchestrator, ScanScheduler};

#[derive(Parser)]
#[command(name = "atlas")]
#[command(about = "Network and container inventory scanner")]
struct Cli {
    /// Config file prefix (default: atlas).
    #[arg(short, long, default_value = "atlas")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Liveness sweep of every local interface.
    Fastscan,
    /// Inspect local Docker containers.
    Dockerscan,
    /// Full port and OS probe of every live host.
    Deepscan,
    /// Run scans periodically per the stored scheduler configuration.
    Scheduler,
    /// Create the inventory tables.
    Initdb,
    /// Show or update the scheduler configuration.
    Config {
        /// Scan interval in minutes.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        interval: Option<u32>,

        /// Enable or disable scheduled scanning.
        #[arg(long)]
        enabled: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let mut discover_config = load_discover_config(&cli.config)?;
    discover_config.apply_env_overrides(|key| std::env::var(key).ok());
    let discover_config = Arc::new(discover_config);

    let store = InventoryStore::connect(&discover_config.store_config()).await?;
    store.initialize_schema().await?;

    match cli.command {
        Command::Initdb => {
            tracing::info!(path = %discover_config.database_path.display(), "Inventory initialized");
        }
        Command::Config { interval, enabled } => {
            let current = store.scheduler_state().await?;
            if interval.is_some() || enabled.is_some() {
                store
                    .update_scheduler_config(
                        interval.unwrap_or(current.scan_interval_minutes),
                        enabled.unwrap_or(current.enabled),
                    )
                    .await?;
            }
            let state = store.scheduler_state().await?;
            println!("{}", serde_json::to_string_pretty(&state)?);
        }
        Command::Fastscan => run_scan(&store, &discover_config, ScanMode::Fast).await?,
        Command::Dockerscan => run_scan(&store, &discover_config, ScanMode::Container).await?,
        Command::Deepscan => run_scan(&store, &discover_config, ScanMode::Deep).await?,
        Command::Scheduler => {
            let orchestrator = build_orchestrator(&store, &discover_config)?;
            let scheduler =
                ScanScheduler::new(store.clone(), Arc::new(orchestrator), discover_config.scheduler_tick());

            if let Some(minutes) = discover_config.scan_interval_override {
                if let Err(e) = scheduler.apply_interval_override(minutes).await {
                    tracing::warn!(error = %e, "Failed to apply ATLAS_SCAN_INTERVAL");
                }
            }

            tokio::select! {
                result = scheduler.run() => result?,
                _ = tokio::signal::ctrl_c() => tracing::info!("Scheduler stopping"),
            }
        }
    }

    store.close().await;
    Ok(())
}

/// Run one scan mode. Only setup failures make the process exit non-zero.
async fn run_scan(
    store: &InventoryStore,
    config: &Arc<DiscoverConfig>,
    mode: ScanMode,
) -> anyhow::Result<()> {
    let orchestrator = build_orchestrator(store, config)?;
    match orchestrator.run_mode(mode).await {
        Ok(report) => println!("{}", serde_json::to_string_pretty(&report)?),
        Err(e) if e.is_setup() => return Err(e.into()),
        Err(e) => tracing::error!(mode = %mode, error = %e, "Scan failed"),
    }
    Ok(())
}

fn build_orchestrator(
    store: &InventoryStore,
    config: &Arc<DiscoverConfig>,
) -> anyhow::Result<ScanOrchestrator> {
    let probes = Probes::system(config)?;
    Ok(ScanOrchestrator::new(store.clone(), probes, config.clone()))
}

fn load_discover_config(file_prefix: &str) -> anyhow::Result<DiscoverConfig> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix("ATLAS")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    match cfg.get::<DiscoverConfig>("discover") {
        Ok(c) => Ok(c),
        Err(config::ConfigError::NotFound(_)) => Ok(DiscoverConfig::default()),
        Err(e) => Err(e.into()),
    }
}
