//! Configuration system.
//!
//! Loads sync configuration from JSON strings (file IO left to the binaries).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::math::{Position, WorldBounds};

/// Root configuration shared by client/server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Coordinator listen address, e.g. `127.0.0.1:3000`.
    pub server_addr: String,
    /// Client simulation tick rate.
    pub tick_hz: u32,
    /// Coordinator state broadcast rate.
    #[serde(default = "default_hz")]
    pub broadcast_hz: u32,
    #[serde(default = "default_world_width")]
    pub world_width: f64,
    #[serde(default = "default_world_height")]
    pub world_height: f64,
    /// Controlled entity speed in world units per second.
    #[serde(default = "default_speed")]
    pub speed: f64,
    #[serde(default = "default_spawn")]
    pub spawn_x: f64,
    #[serde(default = "default_spawn")]
    pub spawn_y: f64,
}

fn default_hz() -> u32 {
    60
}

fn default_world_width() -> f64 {
    800.0
}

fn default_world_height() -> f64 {
    600.0
}

fn default_speed() -> f64 {
    200.0
}

fn default_spawn() -> f64 {
    100.0
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3000".to_string(),
            tick_hz: default_hz(),
            broadcast_hz: default_hz(),
            world_width: default_world_width(),
            world_height: default_world_height(),
            speed: default_speed(),
            spawn_x: default_spawn(),
            spawn_y: default_spawn(),
        }
    }
}

impl SyncConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// WebSocket URL clients dial.
    pub fn server_url(&self) -> String {
        format!("ws://{}", self.server_addr)
    }

    pub fn bounds(&self) -> WorldBounds {
        WorldBounds::new(self.world_width, self.world_height)
    }

    pub fn spawn(&self) -> Position {
        Position::new(self.spawn_x, self.spawn_y)
    }

    /// Length of one client tick. A zero rate is treated as 1 Hz.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_hz.max(1) as f64)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.broadcast_hz.max(1) as f64)
    }
}
