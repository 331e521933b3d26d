//! Coordinator.
//!
//! Owns the canonical [`StateTable`] and the set of connected peers. It is
//! driven entirely by [`PeerEvent`]s and broadcast ticks from a single task,
//! so neither the table nor the peer map needs a lock.
//!
//! Each peer is reached through a bounded [`Outbox`] drained by that peer's
//! writer task. A full or closed outbox only costs that one peer a frame.

use std::{
    collections::{BTreeSet, HashMap},
    sync::atomic::{AtomicU64, Ordering},
};

use sync_shared::{
    id::ParticipantId,
    math::Position,
    net::{decode, encode, Delivery, Disposition, NetMsg, Outbox},
};
use tracing::{debug, info, trace, warn};

use crate::table::StateTable;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transport connection. Unrelated to [`ParticipantId`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn new_unique() -> Self {
        ConnectionId(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Lifecycle notifications from connection tasks.
#[derive(Debug)]
pub enum PeerEvent {
    Connected { conn: ConnectionId, outbox: Outbox },
    Message { conn: ConnectionId, raw: String },
    Disconnected { conn: ConnectionId },
}

struct Peer {
    outbox: Outbox,
    /// Participant ids this connection has sent updates for.
    claimed: BTreeSet<ParticipantId>,
}

#[derive(Default)]
pub struct Coordinator {
    table: StateTable,
    peers: HashMap<ConnectionId, Peer>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self) -> &StateTable {
        &self.table
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    pub fn handle(&mut self, event: PeerEvent) {
        match event {
            PeerEvent::Connected { conn, outbox } => self.on_connect(conn, outbox),
            PeerEvent::Message { conn, raw } => {
                self.on_message(conn, &raw);
            }
            PeerEvent::Disconnected { conn } => {
                self.on_disconnect(conn);
            }
        }
    }

    /// Registers a peer and sends it the current state right away.
    pub fn on_connect(&mut self, conn: ConnectionId, outbox: Outbox) {
        self.peers.insert(
            conn,
            Peer {
                outbox,
                claimed: BTreeSet::new(),
            },
        );
        debug!(?conn, peers = self.peers.len(), "Peer registered");

        match encode(&self.table.state_message()) {
            Ok(payload) => {
                self.send(conn, payload);
            }
            Err(e) => warn!(?conn, error = %e, "Failed to encode initial state"),
        }
    }

    /// Decodes and applies one inbound frame. Never fails past this point.
    pub fn on_message(&mut self, conn: ConnectionId, raw: &str) -> Disposition {
        match decode(raw) {
            Ok(NetMsg::Update { id, x, y }) => {
                self.on_update(conn, id, Position::new(x, y));
                Disposition::Applied
            }
            Ok(NetMsg::State { .. }) => {
                trace!(?conn, "Ignoring state sent by a client");
                Disposition::Ignored
            }
            Ok(NetMsg::Unknown) => {
                trace!(?conn, "Ignoring unknown message type");
                Disposition::Ignored
            }
            Err(e) => {
                warn!(?conn, error = %e, "Dropping malformed message");
                Disposition::Dropped
            }
        }
    }

    /// Upserts `id` and remembers that `conn` speaks for it.
    pub fn on_update(&mut self, conn: ConnectionId, id: ParticipantId, pos: Position) {
        if let Some(peer) = self.peers.get_mut(&conn) {
            if !peer.claimed.contains(&id) {
                peer.claimed.insert(id.clone());
            }
        }
        if self.table.on_update(id.clone(), pos) {
            info!(?conn, participant = %id, x = pos.x, y = pos.y, "Participant joined");
        }
    }

    /// Forgets a peer and removes every participant it spoke for.
    pub fn on_disconnect(&mut self, conn: ConnectionId) -> Vec<ParticipantId> {
        let Some(peer) = self.peers.remove(&conn) else {
            return Vec::new();
        };
        let removed: Vec<_> = peer
            .claimed
            .into_iter()
            .filter(|id| self.table.on_disconnect(id).is_some())
            .collect();
        for id in &removed {
            info!(?conn, participant = %id, "Participant left");
        }
        removed
    }

    /// Queues a payload for one peer without waiting.
    ///
    /// A peer whose queue is full misses this frame; it catches up on the
    /// next broadcast.
    pub fn send(&self, conn: ConnectionId, payload: String) -> Delivery {
        let Some(peer) = self.peers.get(&conn) else {
            return Delivery::Closed;
        };
        let delivery = peer.outbox.offer(payload);
        match delivery {
            Delivery::Queued => {}
            Delivery::Skipped => debug!(?conn, "Peer outbox full, frame skipped"),
            Delivery::Closed => debug!(?conn, "Send to closed peer skipped"),
        }
        delivery
    }

    /// Queues a payload for every peer. Returns how many accepted it.
    pub fn broadcast_payload(&self, payload: &str) -> usize {
        self.peers
            .keys()
            .filter(|&&conn| self.send(conn, payload.to_owned()) == Delivery::Queued)
            .count()
    }

    /// Sends the whole table to every peer.
    pub fn broadcast(&self) -> anyhow::Result<usize> {
        let payload = encode(&self.table.state_message())?;
        Ok(self.broadcast_payload(&payload))
    }

    /// Drops every peer and entry. Dropped outboxes close their connections.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.table.clear();
    }
}
