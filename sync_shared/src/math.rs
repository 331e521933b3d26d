//! Math types.
//!
//! Positions live in a flat 2D world frame with the origin in the top-left
//! corner. Coordinates are `f64` so values survive a JSON round trip unchanged.

use serde::{Deserialize, Serialize};

/// A point in the shared world frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Offsets this position by a velocity applied over `dt` seconds.
    pub fn advanced(self, vx: f64, vy: f64, dt: f64) -> Self {
        Self::new(self.x + vx * dt, self.y + vy * dt)
    }
}

/// Axis-aligned world rectangle spanning `[0, width] x [0, height]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub width: f64,
    pub height: f64,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

impl WorldBounds {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Clamps a position into the rectangle.
    pub fn clamp(&self, pos: Position) -> Position {
        Position::new(pos.x.clamp(0.0, self.width), pos.y.clamp(0.0, self.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_pulls_outside_points_to_edges() {
        let bounds = WorldBounds::new(800.0, 600.0);
        assert_eq!(
            bounds.clamp(Position::new(-5.0, 650.0)),
            Position::new(0.0, 600.0)
        );
        assert_eq!(
            bounds.clamp(Position::new(400.0, 300.0)),
            Position::new(400.0, 300.0)
        );
    }

    #[test]
    fn advanced_scales_velocity_by_dt() {
        let p = Position::new(100.0, 100.0).advanced(200.0, -200.0, 0.5);
        assert_eq!(p, Position::new(200.0, 0.0));
    }
}
