//! xquery - run one read query across many databases, get one CSV back.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tokio::net::TcpListener;
use tracing::{info, warn};

use xquery_lib::{observability, server, AppState, Config};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser, Debug)]
#[command(name = "xquery")]
#[command(about = "Read-only scatter-gather query gateway for sharded SQL databases")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config/xquery.toml")]
    config: PathBuf,

    /// Listen address, overrides `server.listen`
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    let addr = config.listen_addr()?;

    observability::init_tracing(config.server.log_dir.as_deref());

    if config.server.auth_keys.is_empty() {
        warn!("server.auth_keys is empty, every query will be rejected");
    }
    if config.dbs.is_empty() {
        warn!("no hosts configured under [dbs]");
    }

    let state = AppState::from_config(&config);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, hosts = config.dbs.len(), "xquery listening");

    server::serve(listener, state, shutdown_signal()).await?;
    info!("xquery stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
