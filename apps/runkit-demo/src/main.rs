use anyhow::Result;
use clap::{Parser, Subcommand};
use runkit::{Registry, ShutdownOptions};
use runkit_bootstrap::{AppConfig, AppConfigProvider, CliArgs};

use std::path::PathBuf;
use std::sync::Arc;

mod services;

use services::{Auditor, ConfigStore, Greeter};

/// Runkit demo - a handful of services wired through the runtime
#[derive(Parser)]
#[command(name = "runkit-demo")]
#[command(about = "Runkit demo - a handful of services wired through the runtime")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print effective configuration (YAML) and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the services and wait for Ctrl+C
    Run,
    /// Validate configuration and exit
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    // Layered config:
    // 1) defaults -> 2) YAML (if provided) -> 3) env (APP__*) -> 4) CLI overrides
    // Also normalizes + creates home_dir.
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    runkit_bootstrap::init_logging(&config);
    tracing::info!(home_dir = %config.home_dir, "runkit demo starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_services(config).await,
        Commands::Check => check_config(config),
    }
}

async fn run_services(config: AppConfig) -> Result<()> {
    let provider = AppConfigProvider::new(config.clone());
    let registry = Registry::with_config(config.runtime.clone());
    // Catch an interrupt that arrives while services are still registering.
    registry.listen_for_signals();

    // Added out of dependency order on purpose: the greeter waits for the store.
    registry.add(Arc::new(Auditor::default()));
    registry.add(Arc::new(Greeter::from_provider(&provider)?));
    registry.add(Arc::new(ConfigStore::from_provider(
        &provider,
        config.home_path(),
    )?));

    let report = registry.run(ShutdownOptions::Signals).await;
    if report.is_clean() {
        tracing::info!(stopped = report.stopped.len(), "all services stopped cleanly");
        return Ok(());
    }
    for failure in &report.failures {
        tracing::error!(error = %failure, "shutdown failure");
    }
    anyhow::bail!("{} service(s) failed to shut down", report.failures.len())
}

fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration…");
    // If load_layered/load_or_default succeeded and home_dir normalized, we're good.
    println!("Configuration is valid");
    println!("{}", config.to_yaml()?);
    Ok(())
}
