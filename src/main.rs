//! NYT news gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────────────┐
//!                    │                      NEWS GATEWAY                         │
//!                    │                                                           │
//!   Client Request   │  ┌────────────┐   ┌──────────┐   ┌──────────────────┐    │
//!   ─────────────────┼─▶│ correlation│──▶│ bulkhead │──▶│     handler      │    │
//!                    │  │ trace/limit│   │ (prefix) │   │ news | saved     │    │
//!                    │  └────────────┘   └──────────┘   └────────┬─────────┘    │
//!                    │                                           │              │
//!                    │                          ┌────────────────┼─────────┐    │
//!                    │                          ▼                ▼         │    │
//!                    │                  ┌──────────────┐  ┌────────────┐   │    │
//!                    │                  │ cache client │  │  breaker   │   │    │
//!                    │                  │ (cache cb)   │  │  registry  │   │    │
//!                    │                  └──────┬───────┘  └─────┬──────┘   │    │
//!                    │                         ▼                ▼          │    │
//!   Client Response  │  ┌────────────┐   Redis | memory    NYT API | store  │    │
//!   ◀────────────────┼──│ ETag / 304 │◀──────────────────────────────────────┘    │
//!                    │  │ Problem    │                                          │
//!                    │  └────────────┘                                          │
//!                    │                                                           │
//!                    │  config (watch) · observability · lifecycle · admin API  │
//!                    └──────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use news_gateway::lifecycle::signals::spawn_signal_handler;
use news_gateway::lifecycle::{bootstrap, load, Shutdown};
use news_gateway::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "news-gateway")]
#[command(about = "Caching and resilience gateway for the NYT APIs", long_about = None)]
struct Args {
    /// Path to the TOML config file. Defaults apply when omitted.
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load(args.config.as_deref())?;
    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "news-gateway starting");

    let gateway = bootstrap(config, args.config.as_deref()).await?;
    let config = gateway.config;

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    spawn_signal_handler(shutdown.clone());
    let _watcher = gateway.watcher;

    match &config.listener.tls {
        Some(tls) => {
            let addr: SocketAddr = config.listener.bind_address.parse()?;
            gateway
                .server
                .run_tls(
                    addr,
                    &tls.cert_path,
                    &tls.key_path,
                    gateway.config_updates,
                    shutdown.subscribe(),
                )
                .await?;
        }
        None => {
            let listener = TcpListener::bind(&config.listener.bind_address).await?;
            tracing::info!(address = %listener.local_addr()?, "Listening for connections");
            gateway
                .server
                .run(listener, gateway.config_updates, shutdown.subscribe())
                .await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
