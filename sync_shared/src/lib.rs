//! `sync_shared`
//!
//! Shared libraries used by both client and coordinator.
//!
//! Design goals:
//! - One explicit wire contract (`net::NetMsg`) for both directions.
//! - State lives in owned values passed to constructors, never in globals.
//! - Traits at the collaborator seams (ids, visuals).
//! - No `unsafe`.

pub mod config;
pub mod id;
pub mod math;
pub mod net;
pub mod visual;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::id::*;
    pub use crate::math::*;
    pub use crate::net::*;
    pub use crate::visual::*;
}
