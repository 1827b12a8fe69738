//! overlaymgrd - Overlay Manager Daemon
//!
//! Entry point for the overlaymgrd daemon.

use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use cni_overlay_common::ShellRunner;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use cni_overlaymgrd::config::DEFAULT_CONFIG_PATH;
use cni_overlaymgrd::{OverlayAgent, OverlayConfig};

#[derive(Debug, Parser)]
#[command(name = "overlaymgrd", version, about = "VXLAN overlay agent")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("invalid log filter")?;

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {}", e))
}

/// Resolves on SIGTERM or SIGINT, naming the signal
///
/// The SIGTERM handler is installed before this returns, so the signal is
/// not lost while the agent is still starting.
fn shutdown_signal() -> anyhow::Result<impl Future<Output = &'static str>> {
    let mut term = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    Ok(async move {
        tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = tokio::signal::ctrl_c() => "SIGINT",
        }
    })
}

async fn serve(config: &OverlayConfig) -> anyhow::Result<()> {
    let agent = OverlayAgent::start(config, Arc::new(ShellRunner))
        .await
        .context("agent startup failed")?;
    agent.run().await;
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = OverlayConfig::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let shutdown = shutdown_signal()?;
    tokio::select! {
        res = serve(&config) => res,
        signal = shutdown => {
            info!(signal, "Received shutdown signal");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(e) = init_logging(&args.log_level) {
        eprintln!("overlaymgrd: {:#}", e);
        return ExitCode::FAILURE;
    }

    info!("--- Starting overlaymgrd ---");

    match run(args).await {
        Ok(()) => {
            info!("overlaymgrd exiting");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("overlaymgrd failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
