//! Input handling.
//!
//! Directional intent comes from whatever polls the keyboard; this module only
//! turns it into per-tick movement of the controlled entity.

use sync_shared::math::{Position, WorldBounds};

/// Directional intent sampled for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl InputState {
    pub const IDLE: Self = Self {
        left: false,
        right: false,
        up: false,
        down: false,
    };

    /// Velocity for this intent. Left beats right and up beats down when both
    /// are held; diagonals are not normalized.
    pub fn velocity(self, speed: f64) -> (f64, f64) {
        let vx = if self.left {
            -speed
        } else if self.right {
            speed
        } else {
            0.0
        };
        let vy = if self.up {
            -speed
        } else if self.down {
            speed
        } else {
            0.0
        };
        (vx, vy)
    }
}

/// Moves `pos` by one tick of `input` and keeps it inside `bounds`.
pub fn step_position(
    pos: Position,
    input: InputState,
    speed: f64,
    dt: f64,
    bounds: &WorldBounds,
) -> Position {
    let (vx, vy) = input.velocity(speed);
    bounds.clamp(pos.advanced(vx, vy, dt))
}
