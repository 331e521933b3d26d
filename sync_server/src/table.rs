//! Canonical state table.
//!
//! One entry per participant that has sent at least one `update` and has not
//! disconnected since. Writes overwrite; there is no validation and no notion
//! of a stale entry.

use sync_shared::{
    id::ParticipantId,
    math::Position,
    net::{NetMsg, Snapshot},
};

#[derive(Debug, Default, Clone)]
pub struct StateTable {
    entries: Snapshot,
}

impl StateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts a participant's position. Returns `true` when the entry is new.
    pub fn on_update(&mut self, id: ParticipantId, pos: Position) -> bool {
        self.entries.insert(id, pos).is_none()
    }

    /// Removes a participant. This is the only way an entry goes away.
    pub fn on_disconnect(&mut self, id: &ParticipantId) -> Option<Position> {
        self.entries.remove(id)
    }

    pub fn get(&self, id: &ParticipantId) -> Option<Position> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &ParticipantId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.entries
    }

    /// The `state` message carrying the whole table.
    pub fn state_message(&self) -> NetMsg {
        NetMsg::state(self.entries.clone())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_overwrites_then_disconnect_removes() {
        let mut table = StateTable::new();
        let p1 = ParticipantId::new("p1");

        assert!(table.on_update(p1.clone(), Position::new(10.0, 20.0)));
        assert!(!table.on_update(p1.clone(), Position::new(30.0, 40.0)));
        assert_eq!(table.get(&p1), Some(Position::new(30.0, 40.0)));
        assert_eq!(table.len(), 1);

        assert_eq!(table.on_disconnect(&p1), Some(Position::new(30.0, 40.0)));
        assert!(!table.contains(&p1));
        assert!(table.is_empty());
    }

    #[test]
    fn disconnect_of_unknown_id_is_noop() {
        let mut table = StateTable::new();
        table.on_update("a".into(), Position::ORIGIN);
        assert_eq!(table.on_disconnect(&"b".into()), None);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn positions_are_stored_without_validation() {
        let mut table = StateTable::new();
        table.on_update("far".into(), Position::new(-1e9, 1e9));
        assert_eq!(table.get(&"far".into()), Some(Position::new(-1e9, 1e9)));
    }

    #[test]
    fn state_message_mirrors_table() {
        let mut table = StateTable::new();
        table.on_update("p1".into(), Position::new(1.0, 2.0));
        table.on_update("p2".into(), Position::new(3.0, 4.0));
        let NetMsg::State { players } = table.state_message() else {
            panic!("expected state");
        };
        assert_eq!(&players, table.snapshot());
    }
}
