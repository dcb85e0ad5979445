//! devtools-bridge - Debugger-protocol proxy between an IDE and the mono wasm runtime

use clap::Parser;
use devtools_bridge::{ProxyConfig, Server, TransportKind};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "devtools-bridge", version)]
#[command(about = "Managed debugging proxy for the mono wasm runtime", long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address the IDE connects to
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Debugging endpoint of the runtime
    #[arg(long)]
    runtime_url: Option<String>,

    /// Directory that loaded-file urls are resolved against
    #[arg(long)]
    symbol_root: Option<PathBuf>,

    /// Socket framing: websocket or ndjson
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Write the effective configuration to this file and exit
    #[arg(long, value_name = "PATH")]
    save_config: Option<PathBuf>,
}

impl Cli {
    fn to_config(&self) -> anyhow::Result<ProxyConfig> {
        let mut config = match &self.config {
            Some(path) => ProxyConfig::load(path)?,
            None => ProxyConfig::default(),
        };
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(runtime_url) = &self.runtime_url {
            config.runtime_url = runtime_url.clone();
        }
        if let Some(symbol_root) = &self.symbol_root {
            config.symbol_root = symbol_root.clone();
        }
        if let Some(transport) = self.transport {
            config.transport = transport;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.to_config()?;
    if let Some(path) = &cli.save_config {
        config.save(path)?;
        println!("Wrote configuration to {}", path.display());
        return Ok(());
    }

    // RUST_LOG wins over the configured filter.
    let filter = match (std::env::var_os(EnvFilter::DEFAULT_ENV), &config.log_filter) {
        (None, Some(directives)) => EnvFilter::try_new(directives)?,
        _ => EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let server = Server::bind(config).await?;
    let shutdown = server.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    server.run().await?;
    Ok(())
}
