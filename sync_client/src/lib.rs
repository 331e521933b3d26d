//! `sync_client`
//!
//! Client-side systems:
//! - Per-tick movement of the controlled entity from directional intent
//! - Fire-and-forget `update` messages to the coordinator
//! - Reconciliation of remote participants against `state` snapshots

pub mod client;
pub mod input;
pub mod reconciler;

pub use client::SyncClient;
pub use reconciler::Reconciler;
