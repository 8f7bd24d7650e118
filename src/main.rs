//! # stackup
//!
//! Command-line entry point: `run` brings the stack up, `status` reports
//! health and pending provisioning without changing anything.
//!
//! Exit codes: `0` success, `1` a service is not ready, `2` configuration
//! error, `130` interrupted.

use anyhow::Context;
use clap::{Parser, Subcommand};
use stackup::lifecycle::tracing::setup_tracing;
use stackup::lifecycle::Controller;
use stackup::registry::Registry;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error, info, warn};

const CONFIG_ERROR: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "stackup", version, about = "Bring up interdependent services in order")]
struct Cli {
    /// Stack definition file
    #[arg(short, long, global = true, default_value = "stack.toml")]
    config: PathBuf,

    /// Print the report as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start every service in dependency order, probe and provision it
    Run,
    /// Probe every service once and list unsatisfied provisioning checks
    Status,
}

#[tokio::main]
async fn main() -> ExitCode {
    setup_tracing();
    let cli = Cli::parse();

    let controller = match load(&cli.config) {
        Ok(controller) => controller,
        Err(err) => {
            error!("{err:#}");
            return ExitCode::from(CONFIG_ERROR);
        }
    };

    let code = match cli.command {
        Command::Run => run(&controller, cli.json).await,
        Command::Status => status(&controller, cli.json).await,
    };
    match code {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn load(path: &Path) -> anyhow::Result<Controller> {
    let registry = Registry::load(path)
        .with_context(|| format!("loading stack definition {}", path.display()))?;
    let controller = Controller::new(registry)
        .with_context(|| format!("resolving dependencies in {}", path.display()))?;
    if controller.registry().is_empty() {
        warn!(path = %path.display(), "Stack defines no services");
    }
    Ok(controller)
}

async fn run(controller: &Controller, json: bool) -> anyhow::Result<u8> {
    let cancel = controller.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing in-flight steps");
            cancel.cancel();
        }
    });

    for (wave, layer) in controller.graph().layers().iter().enumerate() {
        debug!(wave, services = ?layer, "Bring-up wave");
    }

    let report = controller.run().await.context("run aborted")?;
    print(&report, json)?;
    for unready in report.unready() {
        info!(service = %unready.service, status = %unready.status, "Not ready");
    }
    Ok(report.exit_code())
}

async fn status(controller: &Controller, json: bool) -> anyhow::Result<u8> {
    let report = controller.status().await;
    print(&report, json)?;
    Ok(report.exit_code())
}

fn print<T>(report: &T, json: bool) -> anyhow::Result<()>
where
    T: serde::Serialize + std::fmt::Display,
{
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print!("{report}");
    }
    Ok(())
}
