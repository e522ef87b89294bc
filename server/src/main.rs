use anyhow::Context;
use clap::Parser;
use crac_core::ObservatoryConfig;
use crac_server::{logging, AppContext, Interlock};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Observatory dome automation server
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// Configuration file (JSON)
    #[arg(short, long, env = "CRAC_CONFIG", default_value = "crac.json")]
    config: PathBuf,

    /// Recalibrate both curtains against their limit switches before starting
    #[arg(long)]
    calibrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        ObservatoryConfig::load(&cli.config)
            .with_context(|| format!("loading configuration {}", cli.config.display()))?
    } else {
        ObservatoryConfig::from_json_with_env("{}", std::env::vars())
            .context("building default configuration")?
    };

    logging::init(&config.server).context("initialising logging")?;
    if !cli.config.exists() {
        info!(
            "Configuration {} not found, using defaults",
            cli.config.display()
        );
    }

    let cycle = config.server.control_cycle();
    let ctx = Arc::new(AppContext::build(config).context("assembling the dome")?);
    let interlock = Interlock::new(ctx.clone());

    if cli.calibrate {
        let calibration = interlock.clone();
        let report = tokio::task::spawn_blocking(move || calibration.calibrate())
            .await
            .context("calibration task")?
            .context("calibrating curtains")?;
        if report.is_complete() {
            info!("Curtains calibrated");
        } else {
            warn!(
                east = report.east,
                west = report.west,
                "Curtain calibration not performed on every curtain"
            );
        }
    }

    ctx.telescope.polling_start().await;
    info!("Dome server running, control cycle every {:?}", cycle);

    let mut ticker = tokio::time::interval(cycle);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = interlock.control_cycle();
                match serde_json::to_string(&report) {
                    Ok(json) => debug!("cycle {}", json),
                    Err(e) => error!("Cannot serialize cycle report: {}", e),
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Cannot listen for shutdown signal: {}", e);
                }
                break;
            }
        }
    }

    info!("Shutting down");
    ctx.shutdown().await;
    Ok(())
}
