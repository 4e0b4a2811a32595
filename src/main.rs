use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use restock_monitor::utils::logging::init_logging;
use restock_monitor::utils::telemetry::init_metrics;
use restock_monitor::{AppConfig, AppError, HealthCheck, Orchestrator};

/// Exit status for a configuration that failed to load or validate.
const EXIT_CONFIG_INVALID: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "restock-monitor", version, about = "Watch storefronts for new products and restocks")]
struct Args {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, default_value = "config.toml", env = "RESTOCK_CONFIG")]
    config: PathBuf,

    /// Run the startup health check and exit
    #[arg(long)]
    check: bool,

    /// Skip the startup health check
    #[arg(long, conflicts_with = "check")]
    skip_health_check: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            let config_invalid = e
                .downcast_ref::<AppError>()
                .is_some_and(AppError::is_config_invalid);
            if config_invalid {
                ExitCode::from(EXIT_CONFIG_INVALID)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let config = AppConfig::load(&args.config)
        .with_context(|| format!("invalid configuration in {}", args.config.display()))?;
    let _log_guard = init_logging(&config.logging)?;

    info!(
        "Starting restock-monitor with {} stores and {} endpoints",
        config.stores.len(),
        config.endpoints.len()
    );

    if !args.skip_health_check {
        if let Err(e) = HealthCheck::new(&config)?.run().await {
            error!("Startup health check failed: {}", e);
            return Err(e.into());
        }
    }
    if args.check {
        return Ok(());
    }

    init_metrics(&config.metrics)?;

    let orchestrator = Orchestrator::new(&config)?;
    orchestrator.run_until(shutdown_signal()).await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl+C detected"),
        _ = terminate => info!("SIGTERM detected"),
    }
}
