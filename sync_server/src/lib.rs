//! `sync_server`
//!
//! Coordinator-side systems:
//! - Canonical participant → position table
//! - Connection lifecycle (connect, message, disconnect) over WebSockets
//! - Fixed-rate `state` broadcast to every connected client

pub mod coordinator;
pub mod server;
pub mod table;

pub use coordinator::Coordinator;
pub use server::SyncServer;
pub use table::StateTable;
