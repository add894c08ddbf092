use anyhow::{Context, Result};
use clap::Parser;
use gramchart::config::{Args, ServerConfig};
use gramchart::server;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // stdout carries the protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&args.log_level))
        .context("Invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    server::serve_stdio(ServerConfig::from(&args))
        .await
        .context("Server failed")
}
