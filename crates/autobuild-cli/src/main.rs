// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
mod configfield;
mod selection;

use anyhow::{anyhow, bail, Context, Result};
use autobuild_config::{AutobuildConfig, ConfigError, ConfigStore};
use autobuild_protocol::{IncomingPackage, Request, Response, RpcError};
use autobuild_transport::Connection;
use clap::{Parser, Subcommand};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Exit code for a command-line parse error or an unrecoverable client failure.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "autobuild", version, about = "Client for the autobuild package build daemon")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Root directory the daemon stores its state under.
    #[arg(long, global = true, default_value = "/var/lib/autobuild")]
    base: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Stage one or more package archives to be built.
    Stage {
        /// Archive files to stage.
        files: Vec<PathBuf>,
    },
    /// Review and release finished builds.
    Release,
    /// Review and discard finished builds.
    Discard,
    /// Show or set configuration fields.
    Config {
        /// `field`, `field=value`, or nothing to show everything.
        args: Vec<String>,
    },
    /// Remove the daemon's entire base directory.
    Wipe,
    /// Relay stdin/stdout to the local daemon socket (ssh tunnel helper).
    Connect {
        /// Socket path; defaults to `<base>/run/autobuild.sock`.
        socket: Option<PathBuf>,
    },
    /// Run the long-lived daemon process.
    Daemon,
    /// Open a per-user HTTP view of the build queue.
    Webqueue,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("autobuild=debug")
    } else {
        EnvFilter::try_from_env("AUTOBUILD_LOG").unwrap_or_else(|_| EnvFilter::new("autobuild=info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Stage { files } => cmd_stage(&cli.base, files).await,
        Commands::Release => cmd_release(&cli.base).await,
        Commands::Discard => cmd_discard(&cli.base).await,
        Commands::Config { args } => cmd_config(&cli.base, args),
        Commands::Wipe => cmd_wipe(&cli.base),
        Commands::Connect { socket } => cmd_connect(&cli.base, socket).await,
        Commands::Daemon => {
            bail_daemon();
            Ok(())
        }
        Commands::Webqueue => cmd_webqueue(&cli.base).await,
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn bail_daemon() {
    eprintln!("error: run the `autobuild-daemon` binary to host the service");
    std::process::exit(EXIT_RUNTIME_ERROR);
}

fn config_store(base: &Path) -> ConfigStore {
    ConfigStore::new(base.join("etc/autobuild.json"))
}

async fn connect(base: &Path) -> Result<Connection> {
    let config = config_store(base).load()?;
    let socket_path = base.join("run/autobuild.sock");
    if config.remote.is_empty() {
        Connection::connect_local(&socket_path)
            .await
            .context("connecting to local autobuild socket")
    } else {
        Connection::connect_remote(&config.remote, &socket_path)
            .await
            .context("connecting to remote autobuild daemon over ssh")
    }
}

fn response_error(response: Response) -> Result<Response> {
    if let Response::Error(err) = &response {
        return Err(anyhow!(describe_rpc_error(err)));
    }
    Ok(response)
}

fn describe_rpc_error(err: &RpcError) -> String {
    err.to_string()
}

async fn cmd_stage(base: &Path, files: Vec<PathBuf>) -> Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }
    let mut conn = connect(base).await?;
    for file in files {
        let data = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
        let filename = file
            .file_name()
            .ok_or_else(|| anyhow!("{} has no filename", file.display()))?
            .to_string_lossy()
            .to_string();
        let response = conn
            .call(Request::Stage { filename: filename.clone(), data })
            .await?;
        match response_error(response)? {
            Response::Staged(info) => println!("staged {}", info.basename()),
            other => bail!("unexpected response to Stage: {other:?}"),
        }
    }
    Ok(())
}

async fn fetch_incoming(conn: &mut Connection) -> Result<Vec<IncomingPackage>> {
    match response_error(conn.call(Request::Incoming).await?)? {
        Response::Incoming(packages) => Ok(packages),
        other => bail!("unexpected response to Incoming: {other:?}"),
    }
}

fn print_incoming_list(packages: &[IncomingPackage]) {
    println!("Packages ready to be released:");
    println!();
    let longest = packages.len().to_string().len();
    for (i, pkg) in packages.iter().enumerate() {
        let n = (i + 1).to_string();
        let pad = " ".repeat(longest - n.len());
        println!("  {pad}{n}) {} {}", pkg.distribution_label, pkg.name);
        for file in &pkg.files {
            println!("  {}{}", " ".repeat(longest + 4), file.display());
        }
        println!();
    }
}

fn read_selection_line() -> Result<String> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

async fn cmd_release(base: &Path) -> Result<()> {
    let mut conn = connect(base).await?;
    let packages = fetch_incoming(&mut conn).await?;
    if packages.is_empty() {
        println!("There are no packages staged to be released...");
        return Ok(());
    }
    print_incoming_list(&packages);
    print!("Which packages do you want to release? ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let line = read_selection_line()?;
    let chosen = selection::parse_selection(&line, packages.len())?;
    let ids: Vec<u64> = chosen.into_iter().map(|i| packages[i].id).collect();
    match response_error(conn.call(Request::Release { ids }).await?)? {
        Response::Released { accepted_ids } => {
            println!("released {} package(s)", accepted_ids.len());
        }
        other => bail!("unexpected response to Release: {other:?}"),
    }
    Ok(())
}

async fn cmd_discard(base: &Path) -> Result<()> {
    let mut conn = connect(base).await?;
    let packages = fetch_incoming(&mut conn).await?;
    if packages.is_empty() {
        println!("There are no packages staged to be discarded...");
        return Ok(());
    }
    print_incoming_list(&packages);
    print!("Which packages do you want to discard? ");
    std::io::Write::flush(&mut std::io::stdout())?;
    let line = read_selection_line()?;
    let chosen = selection::parse_selection(&line, packages.len())?;
    let ids: Vec<u64> = chosen.into_iter().map(|i| packages[i].id).collect();
    match response_error(conn.call(Request::Discard { ids }).await?)? {
        Response::Discarded { accepted_ids } => {
            println!("discarded {} package(s)", accepted_ids.len());
        }
        other => bail!("unexpected response to Discard: {other:?}"),
    }
    Ok(())
}

fn cmd_config(base: &Path, args: Vec<String>) -> Result<()> {
    let store = config_store(base);
    if args.is_empty() {
        let config = store.load()?;
        for (field, value) in configfield::leaves(&config)? {
            println!("{field}: {value}");
        }
        return Ok(());
    }

    let mut shown = Vec::new();
    store.update(|config: &mut AutobuildConfig| -> Result<(), ConfigError> {
        let to_field_error = |e: anyhow::Error| ConfigError::Validation { reasons: vec![e.to_string()] };
        for arg in &args {
            match arg.split_once('=') {
                Some((field, value)) => configfield::set(config, field, value).map_err(to_field_error)?,
                None => {
                    let value = configfield::get(config, arg).map_err(to_field_error)?;
                    shown.push((arg.clone(), value));
                }
            }
        }
        config.validate()
    })?;

    for (field, value) in shown {
        println!("{field}: {value}");
    }
    Ok(())
}

fn cmd_wipe(base: &Path) -> Result<()> {
    if base.as_os_str().is_empty() || base == Path::new("/") {
        bail!("refusing to wipe an empty or root base directory");
    }
    if base.exists() {
        std::fs::remove_dir_all(base)?;
    }
    Ok(())
}

async fn cmd_connect(base: &Path, socket: Option<PathBuf>) -> Result<()> {
    let socket_path = socket.unwrap_or_else(|| base.join("run/autobuild.sock"));
    autobuild_transport::run_connect_bridge(&socket_path)
        .await
        .context("relaying connect bridge")?;
    Ok(())
}

async fn cmd_webqueue(base: &Path) -> Result<()> {
    let mut conn = connect(base).await?;
    let socket_path = match response_error(conn.call(Request::WebQueueService).await?)? {
        Response::WebQueueService { socket_path } => socket_path,
        other => bail!("unexpected response to WebQueueService: {other:?}"),
    };
    println!("web queue ready at unix socket {}", socket_path.display());
    println!("bridge it to a browser with: autobuild connect {}", socket_path.display());
    println!("press ctrl-c to close it");

    tokio::signal::ctrl_c().await.ok();
    let _ = conn.call(Request::CloseWebQueueService { socket_path }).await;
    Ok(())
}
