use clap::Parser;
use devpod_mcp_adapter::{register_operations, DevPodAdapter};
use devpod_mcp_protocol::{Dispatcher, OperationRegistry};
use devpod_mcp_transport::{HttpStreamsTransport, SseTransport, StdioTransport, Transport};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

mod config;
mod logging;

use config::{ServerConfig, TransportKind};

#[derive(Parser)]
#[command(name = "devpod-mcp")]
#[command(about = "MCP server for DevPod workspace management", long_about = None)]
#[command(version)]
struct Cli {
    /// Transport binding (stdio, sse, http-streams)
    #[arg(long, value_enum)]
    transport: Option<TransportKind>,

    /// Listen address for the HTTP transports
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Per-request timeout in seconds; 0 disables the deadline
    #[arg(long)]
    request_timeout: Option<u64>,

    /// Path to the devpod binary
    #[arg(long)]
    devpod_bin: Option<String>,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init().map_err(|e| eyre::eyre!("failed to initialize tracing: {e}"))?;

    let env: HashMap<String, String> = std::env::vars().collect();
    let config = ServerConfig::resolve(
        cli.transport,
        cli.addr,
        cli.request_timeout,
        cli.devpod_bin,
        &env,
    )?;

    let adapter = Arc::new(DevPodAdapter::new(config.adapter.clone()));
    if let Err(error) = adapter.check_available().await {
        warn!(%error, "devpod binary not available; operations will fail until it is installed");
    }

    let mut registry = OperationRegistry::new();
    register_operations(&mut registry, adapter);
    let dispatcher = Arc::new(Dispatcher::new(Arc::new(registry)));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut transport: Box<dyn Transport> = match config.transport {
        TransportKind::Stdio => Box::new(StdioTransport::new(
            Arc::clone(&dispatcher),
            config.request_timeout,
        )),
        TransportKind::Sse => Box::new(SseTransport::new(
            Arc::clone(&dispatcher),
            config.addr,
            config.request_timeout,
        )),
        TransportKind::HttpStreams => Box::new(HttpStreamsTransport::new(
            Arc::clone(&dispatcher),
            config.addr,
            config.request_timeout,
            config.session_idle,
        )),
    };

    info!(transport = ?config.transport, "starting devpod-mcp server");
    transport.start(shutdown_rx).await?;
    transport.close().await?;
    info!("server stopped");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(error) => {
                warn!(%error, "failed to install SIGTERM handler; falling back to ctrl-c only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
