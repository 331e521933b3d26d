//! Snapshot reconciliation.
//!
//! The reconciler owns the local view of the session: the controlled entity,
//! moved only by local input, and one proxy per remote participant, created,
//! moved and destroyed only by `state` snapshots from the coordinator.
//!
//! Every snapshot is a full picture of the session, so reconciliation carries
//! no memory between snapshots. After `on_snapshot(S)` the remote set is
//! exactly `keys(S)` minus the local id, whatever it was before.

use std::collections::BTreeMap;

use sync_shared::{
    config::SyncConfig,
    id::ParticipantId,
    math::{Position, WorldBounds},
    net::{decode, Disposition, NetMsg, Snapshot},
    visual::VisualBackend,
};
use tracing::{debug, trace, warn};

use crate::input::{step_position, InputState};

pub struct Reconciler<V> {
    local_id: ParticipantId,
    local: Position,
    bounds: WorldBounds,
    speed: f64,
    remotes: BTreeMap<ParticipantId, Position>,
    visuals: V,
}

impl<V: VisualBackend> Reconciler<V> {
    pub fn new(
        local_id: ParticipantId,
        spawn: Position,
        bounds: WorldBounds,
        speed: f64,
        visuals: V,
    ) -> Self {
        Self {
            local_id,
            local: bounds.clamp(spawn),
            bounds,
            speed,
            remotes: BTreeMap::new(),
            visuals,
        }
    }

    pub fn from_config(local_id: ParticipantId, cfg: &SyncConfig, visuals: V) -> Self {
        Self::new(local_id, cfg.spawn(), cfg.bounds(), cfg.speed, visuals)
    }

    pub fn local_id(&self) -> &ParticipantId {
        &self.local_id
    }

    pub fn local_position(&self) -> Position {
        self.local
    }

    /// Advances the controlled entity by one tick of `input`.
    pub fn apply_input(&mut self, input: InputState, dt: f64) -> Position {
        self.local = step_position(self.local, input, self.speed, dt, &self.bounds);
        self.local
    }

    /// The `update` message announcing the controlled entity's position.
    pub fn update_message(&self) -> NetMsg {
        NetMsg::update(self.local_id.clone(), self.local)
    }

    /// Brings the remote set and positions into line with `snapshot`.
    pub fn on_snapshot(&mut self, snapshot: &Snapshot) {
        let visuals = &mut self.visuals;
        let before = self.remotes.len();
        self.remotes.retain(|id, _| {
            let keep = snapshot.contains_key(id);
            if !keep {
                visuals.destroy_visual(id);
            }
            keep
        });
        let removed = before - self.remotes.len();

        let mut created = 0usize;
        for (id, &pos) in snapshot {
            if *id == self.local_id {
                continue;
            }
            match self.remotes.get_mut(id) {
                Some(slot) => {
                    *slot = pos;
                    self.visuals.move_visual(id, pos);
                }
                None => {
                    self.remotes.insert(id.clone(), pos);
                    self.visuals.create_visual(id, pos);
                    created += 1;
                }
            }
        }

        if created > 0 || removed > 0 {
            debug!(created, removed, remotes = self.remotes.len(), "Reconciled snapshot");
        }
    }

    /// Handles one raw frame from the coordinator.
    ///
    /// Frames that fail to decode are dropped; they never reach the remote set.
    pub fn on_message(&mut self, raw: &str) -> Disposition {
        match decode(raw) {
            Ok(NetMsg::State { players }) => {
                self.on_snapshot(&players);
                Disposition::Applied
            }
            Ok(NetMsg::Update { id, .. }) => {
                trace!(participant = %id, "Ignoring update addressed to coordinator");
                Disposition::Ignored
            }
            Ok(NetMsg::Unknown) => {
                trace!("Ignoring unknown message type");
                Disposition::Ignored
            }
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                Disposition::Dropped
            }
        }
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.remotes.keys()
    }

    pub fn remote_position(&self, id: &ParticipantId) -> Option<Position> {
        self.remotes.get(id).copied()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    pub fn visuals(&self) -> &V {
        &self.visuals
    }

    pub fn visuals_mut(&mut self) -> &mut V {
        &mut self.visuals
    }

    /// Ends the session: every remote proxy is destroyed.
    pub fn clear(&mut self) {
        for id in std::mem::take(&mut self.remotes).into_keys() {
            self.visuals.destroy_visual(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Create(String, Position),
        Move(String, Position),
        Destroy(String),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Vec<Call>,
    }

    impl VisualBackend for Recorder {
        fn create_visual(&mut self, id: &ParticipantId, pos: Position) {
            self.calls.push(Call::Create(id.to_string(), pos));
        }
        fn move_visual(&mut self, id: &ParticipantId, pos: Position) {
            self.calls.push(Call::Move(id.to_string(), pos));
        }
        fn destroy_visual(&mut self, id: &ParticipantId) {
            self.calls.push(Call::Destroy(id.to_string()));
        }
    }

    fn reconciler(local: &str) -> Reconciler<Recorder> {
        Reconciler::new(
            ParticipantId::new(local),
            Position::new(100.0, 100.0),
            WorldBounds::default(),
            200.0,
            Recorder::default(),
        )
    }

    fn snap(entries: &[(&str, f64, f64)]) -> Snapshot {
        entries
            .iter()
            .map(|&(id, x, y)| (ParticipantId::new(id), Position::new(x, y)))
            .collect()
    }

    fn remote_set(r: &Reconciler<Recorder>) -> BTreeSet<String> {
        r.remote_ids().map(|id| id.to_string()).collect()
    }

    #[test]
    fn unknown_ids_are_created_at_given_position() {
        let mut r = reconciler("me");
        r.on_snapshot(&snap(&[("a", 1.0, 2.0), ("b", 3.0, 4.0)]));
        assert_eq!(
            r.visuals().calls,
            vec![
                Call::Create("a".into(), Position::new(1.0, 2.0)),
                Call::Create("b".into(), Position::new(3.0, 4.0)),
            ]
        );
        assert_eq!(r.remote_position(&"b".into()), Some(Position::new(3.0, 4.0)));
    }

    #[test]
    fn known_ids_are_overwritten_verbatim() {
        let mut r = reconciler("me");
        r.on_snapshot(&snap(&[("a", 1.0, 2.0)]));
        r.on_snapshot(&snap(&[("a", 50.0, 60.0)]));
        assert_eq!(r.remote_position(&"a".into()), Some(Position::new(50.0, 60.0)));
        assert_eq!(
            r.visuals().calls.last(),
            Some(&Call::Move("a".into(), Position::new(50.0, 60.0)))
        );
    }

    #[test]
    fn applying_same_snapshot_twice_is_idempotent() {
        let mut r = reconciler("me");
        let s = snap(&[("a", 1.0, 2.0), ("b", 3.0, 4.0), ("me", 9.0, 9.0)]);
        r.on_snapshot(&s);
        let ids = remote_set(&r);
        let positions: Vec<_> = r.remote_ids().map(|id| r.remote_position(id)).collect();

        r.on_snapshot(&s);
        assert_eq!(remote_set(&r), ids);
        let again: Vec<_> = r.remote_ids().map(|id| r.remote_position(id)).collect();
        assert_eq!(again, positions);
        assert!(!r
            .visuals()
            .calls
            .iter()
            .any(|c| matches!(c, Call::Destroy(_))));
    }

    #[test]
    fn remote_set_equals_snapshot_minus_local() {
        let mut r = reconciler("me");
        let cases = [
            snap(&[("a", 0.0, 0.0), ("me", 1.0, 1.0)]),
            snap(&[("b", 0.0, 0.0), ("c", 0.0, 0.0)]),
            snap(&[]),
            snap(&[("me", 5.0, 5.0)]),
            snap(&[("a", 1.0, 1.0), ("c", 2.0, 2.0), ("d", 3.0, 3.0)]),
        ];
        for s in &cases {
            r.on_snapshot(s);
            let expected: BTreeSet<String> = s
                .keys()
                .filter(|id| id.as_str() != "me")
                .map(|id| id.to_string())
                .collect();
            assert_eq!(remote_set(&r), expected);
        }
    }

    #[test]
    fn local_entity_is_never_touched_by_snapshots() {
        let mut r = reconciler("me");
        r.on_snapshot(&snap(&[("me", 700.0, 500.0), ("a", 1.0, 1.0)]));
        r.on_snapshot(&snap(&[("a", 2.0, 2.0)]));
        r.on_snapshot(&snap(&[("me", 1.0, 1.0)]));

        assert_eq!(r.local_position(), Position::new(100.0, 100.0));
        assert!(r.visuals().calls.iter().all(|c| match c {
            Call::Create(id, _) | Call::Move(id, _) | Call::Destroy(id) => id != "me",
        }));
    }

    #[test]
    fn omitted_id_is_destroyed_and_survivor_updated() {
        let mut r = reconciler("me");
        r.on_snapshot(&snap(&[("A", 1.0, 1.0), ("B", 2.0, 2.0)]));
        r.visuals_mut().calls.clear();

        r.on_snapshot(&snap(&[("A", 7.0, 8.0)]));
        assert_eq!(
            r.visuals().calls,
            vec![
                Call::Destroy("B".into()),
                Call::Move("A".into(), Position::new(7.0, 8.0)),
            ]
        );
        assert_eq!(r.remote_position(&"A".into()), Some(Position::new(7.0, 8.0)));
        assert_eq!(r.remote_position(&"B".into()), None);
    }

    #[test]
    fn malformed_and_foreign_messages_leave_remotes_alone() {
        let mut r = reconciler("me");
        r.on_snapshot(&snap(&[("a", 1.0, 1.0)]));

        assert_eq!(r.on_message("{nope"), Disposition::Dropped);
        assert_eq!(
            r.on_message(r#"{"type":"state","players":{"a":{"x":"bad"}}}"#),
            Disposition::Dropped
        );
        assert_eq!(
            r.on_message(r#"{"type":"update","id":"a","x":0,"y":0}"#),
            Disposition::Ignored
        );
        assert_eq!(r.on_message(r#"{"type":"chat","text":"hi"}"#), Disposition::Ignored);

        assert_eq!(remote_set(&r), BTreeSet::from(["a".to_string()]));
        assert_eq!(r.remote_position(&"a".into()), Some(Position::new(1.0, 1.0)));
    }

    #[test]
    fn state_message_is_reconciled() {
        let mut r = reconciler("me");
        let disposition =
            r.on_message(r#"{"type":"state","players":{"x1":{"x":10,"y":20},"me":{"x":0,"y":0}}}"#);
        assert_eq!(disposition, Disposition::Applied);
        assert_eq!(remote_set(&r), BTreeSet::from(["x1".to_string()]));
    }

    #[test]
    fn input_moves_local_and_update_carries_it() {
        let mut r = reconciler("me");
        let input = InputState {
            right: true,
            ..Default::default()
        };
        let pos = r.apply_input(input, 0.5);
        assert_eq!(pos, Position::new(200.0, 100.0));
        assert_eq!(
            r.update_message(),
            NetMsg::Update {
                id: "me".into(),
                x: 200.0,
                y: 100.0
            }
        );
    }

    #[test]
    fn clear_destroys_every_remote() {
        let mut r = reconciler("me");
        r.on_snapshot(&snap(&[("a", 1.0, 1.0), ("b", 2.0, 2.0)]));
        r.visuals_mut().calls.clear();
        r.clear();
        assert_eq!(r.remote_count(), 0);
        assert_eq!(
            r.visuals().calls,
            vec![Call::Destroy("a".into()), Call::Destroy("b".into())]
        );
    }
}
