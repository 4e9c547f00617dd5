// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod handler;
mod tmpfs;

use anyhow::{Context, Result};
use autobuild_builder::PdebuildBuilder;
use autobuild_config::ConfigStore;
use autobuild_coordinator::BuildCoordinator;
use autobuild_publisher::RepreproPublisher;
use autobuild_transport::Server;
use clap::Parser;
use handler::DaemonHandler;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "autobuild-daemon", version, about = "Long-lived autobuild build service")]
struct Args {
    /// Root directory under which all daemon state lives.
    #[arg(long, default_value = "/var/lib/autobuild")]
    base: PathBuf,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("autobuild=debug")
    } else {
        EnvFilter::try_from_env("AUTOBUILD_LOG").unwrap_or_else(|_| EnvFilter::new("autobuild=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config_store = Arc::new(ConfigStore::new(args.base.join("etc/autobuild.json")));
    let config = config_store.load().context("loading configuration")?;
    config.validate().context("validating configuration")?;

    if config.use_tmpfs {
        tmpfs::mount(&args.base).await;
    }

    let builder = Arc::new(PdebuildBuilder::new(args.base.clone()));
    let publisher = Arc::new(RepreproPublisher::new(args.base.clone()));
    let coordinator = Arc::new(BuildCoordinator::new(
        args.base.clone(),
        Arc::clone(&config_store),
        builder,
        publisher,
    ));

    coordinator.load().await.context("restoring persisted coordinator state")?;

    let worker_coordinator = Arc::clone(&coordinator);
    let worker = tokio::spawn(async move {
        worker_coordinator.run_worker().await;
    });

    let handler = Arc::new(DaemonHandler::new(Arc::clone(&coordinator), &args.base));
    let server = Server::new(args.base.join("run/autobuild.sock"), config.group.clone(), handler);
    let server_socket_path = server.socket_path().to_path_buf();
    let server_task = tokio::spawn(async move {
        if let Err(err) = server.serve().await {
            warn!(error = %err, "rpc server exited with an error");
        }
    });

    info!(base = %args.base.display(), "autobuild daemon started");

    let mut sigterm = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;

    let exit_code = tokio::select! {
        _ = sigterm.recv() => {
            info!("received SIGTERM, shutting down gracefully");
            0
        }
        _ = sigint.recv() => {
            info!("received SIGINT, shutting down immediately");
            1
        }
    };

    worker.abort();
    server_task.abort();
    let _ = std::fs::remove_file(&server_socket_path);

    if exit_code == 0 {
        if let Err(err) = coordinator.save().await {
            warn!(error = %err, "failed to persist coordinator state on shutdown");
        }
    }

    if config.use_tmpfs {
        tmpfs::unmount(&args.base).await;
    }

    std::process::exit(exit_code);
}
