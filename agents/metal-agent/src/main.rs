//! Metal Agent
//!
//! Runs on a bare-metal host and serves power management, reboot and disk
//! wipe to the provider over a reverse tunnel.
//!
//! Power management provisions an administrator account on the host's BMC
//! through the local IPMI interface and reports the BMC's LAN endpoint.
//! Reboot and disk wipe are delegated to the host control plane.

mod agent;
mod backoff;
mod coalesce;
mod config;
mod error;
mod rpc;
mod service;
mod tunnel;

#[cfg(test)]
mod service_test;
#[cfg(test)]
mod test_utils;

use crate::agent::Agent;
use crate::config::{Args, Config};
use crate::error::AgentError;
use clap::Parser;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{filter::EnvFilter, filter::LevelFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<(), AgentError> {
    let args = Args::parse();

    let level = if args.debug {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(env_filter)
        .init();

    let config = Config::load(args).await?;

    let shutdown = CancellationToken::new();
    let mut term_signal = signal(SignalKind::terminate())?;
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            tokio::select! {
                _ = term_signal.recv() => info!("Received SIGTERM, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down"),
            }
            shutdown.cancel();
        }
    });

    Agent::new(config).run(shutdown).await?;

    info!("Metal Agent stopped");
    Ok(())
}
