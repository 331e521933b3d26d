//! Visual collaborator abstraction.
//!
//! The sync core never draws. Whatever presents entities implements
//! [`VisualBackend`] and receives create/move/destroy calls from the client
//! reconciler.

use tracing::{debug, info};

use crate::{id::ParticipantId, math::Position};

pub trait VisualBackend {
    fn create_visual(&mut self, id: &ParticipantId, pos: Position);
    fn move_visual(&mut self, id: &ParticipantId, pos: Position);
    fn destroy_visual(&mut self, id: &ParticipantId);
}

/// A no-op backend useful for headless tests.
#[derive(Debug, Default)]
pub struct NullVisuals;

impl VisualBackend for NullVisuals {
    fn create_visual(&mut self, _id: &ParticipantId, _pos: Position) {}
    fn move_visual(&mut self, _id: &ParticipantId, _pos: Position) {}
    fn destroy_visual(&mut self, _id: &ParticipantId) {}
}

/// Reports visual changes through `tracing`. Used by the headless client.
#[derive(Debug, Default)]
pub struct TracingVisuals;

impl VisualBackend for TracingVisuals {
    fn create_visual(&mut self, id: &ParticipantId, pos: Position) {
        info!(participant = %id, x = pos.x, y = pos.y, "Participant appeared");
    }

    fn move_visual(&mut self, id: &ParticipantId, pos: Position) {
        debug!(participant = %id, x = pos.x, y = pos.y, "Participant moved");
    }

    fn destroy_visual(&mut self, id: &ParticipantId) {
        info!(participant = %id, "Participant left");
    }
}
