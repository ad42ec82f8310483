use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use clout_relay::config::RelayConfig;
use clout_relay::server::{resolve_listen_addr, router, RelayServer};

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (CLOUT_LOG_JSON=1), human-readable otherwise.
    let json_logs = std::env::var("CLOUT_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("clout_relay=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let config = RelayConfig::parse();
    if config.tor_only && !config.listen_is_loopback() {
        tracing::warn!("--tor-only requires a loopback --listen address; refusing to bind {}", config.listen);
        anyhow::bail!("tor-only mode declines non-loopback bind {}", config.listen);
    }

    tracing::info!("Starting relay on {}", config.listen);
    let addr = resolve_listen_addr(&config.listen)?;
    let server = Arc::new(RelayServer::new(config));
    let _sweepers = server.spawn_sweepers();

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(server)).await?;
    Ok(())
}
