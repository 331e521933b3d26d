//! Standalone coordinator binary.
//!
//! Usage:
//!   cargo run -p sync_server -- [--config sync.json] [--addr 127.0.0.1:3000] [--broadcast-hz 60]
//!
//! The server accepts WebSocket clients, records their reported positions, and
//! broadcasts the full table to all of them at a fixed rate. Stop with Ctrl-C.

use std::env;

use anyhow::Context;
use sync_server::server::SyncServer;
use sync_shared::config::SyncConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<SyncConfig> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => {
            let raw = std::fs::read_to_string(&args[i + 1])
                .with_context(|| format!("read config {}", args[i + 1]))?;
            SyncConfig::from_json_str(&raw).context("parse config")?
        }
        _ => SyncConfig::default(),
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--broadcast-hz" if i + 1 < args.len() => {
                cfg.broadcast_hz = args[i + 1].parse().unwrap_or(cfg.broadcast_hz);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(addr = %cfg.server_addr, broadcast_hz = cfg.broadcast_hz, "Starting server");

    let mut server = SyncServer::bind(cfg).await.context("create server")?;
    let local = server.local_addr()?;
    info!(%local, "Server listening");

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
