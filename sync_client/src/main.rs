//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p sync_client -- [--config sync.json] [--addr 127.0.0.1:3000] [--tick-hz 60]
//!
//! The client connects to the coordinator, walks its entity around a square,
//! and logs remote participants appearing, moving and leaving.

use std::env;

use anyhow::Context;
use sync_client::{client::SyncClient, input::InputState};
use sync_shared::{config::SyncConfig, id::RandomIdGenerator, visual::TracingVisuals};
use tracing::info;

/// Ticks spent walking in each direction.
const LEG_TICKS: u64 = 90;

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
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(cfg.tick_hz);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(cfg)
}

/// Right, down, left, up, repeat.
fn wander(tick: u64) -> InputState {
    match (tick / LEG_TICKS) % 4 {
        0 => InputState {
            right: true,
            ..Default::default()
        },
        1 => InputState {
            down: true,
            ..Default::default()
        },
        2 => InputState {
            left: true,
            ..Default::default()
        },
        _ => InputState {
            up: true,
            ..Default::default()
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    info!(server = %cfg.server_addr, tick_hz = cfg.tick_hz, "Starting client");

    let mut ids = RandomIdGenerator::from_entropy();
    let mut client = SyncClient::connect(&cfg, &mut ids, TracingVisuals)
        .await
        .context("connect")?;

    client
        .run_until(wander, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    info!(
        ticks = client.tick_count(),
        remotes = client.reconciler.remote_count(),
        "Shutting down client"
    );
    client.close().await?;
    Ok(())
}
