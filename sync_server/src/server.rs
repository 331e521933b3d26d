//! Server implementation.
//!
//! The server accepts WebSocket connections, forwards every connection's
//! events to the [`Coordinator`], and broadcasts the canonical table on a fixed
//! timer (`broadcast_hz`), independent of how often updates arrive.
//!
//! Task layout:
//! - One task runs [`SyncServer::run_until`] and owns the coordinator.
//! - One task per connection reads frames and forwards them as events.
//! - One writer task per connection drains that peer's bounded outbox, so a
//!   peer that stops reading never holds up its own reads or anyone else.

use std::{
    future::Future,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use anyhow::Context;
use sync_shared::{
    config::SyncConfig,
    net::{spawn_writer, MessageConn, Outbox, OUTBOX_CAPACITY},
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::mpsc,
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::coordinator::{ConnectionId, Coordinator, PeerEvent};

/// Position sync server.
pub struct SyncServer {
    pub cfg: SyncConfig,
    coordinator: Coordinator,
    listener: TcpListener,
    events_tx: mpsc::UnboundedSender<PeerEvent>,
    events_rx: mpsc::UnboundedReceiver<PeerEvent>,
    broadcasts: u64,
}

impl SyncServer {
    /// Binds the listener at `cfg.server_addr`.
    pub async fn bind(cfg: SyncConfig) -> anyhow::Result<Self> {
        let addr: SocketAddr = cfg.server_addr.parse().context("parse server_addr")?;
        let listener = TcpListener::bind(addr).await.context("tcp bind")?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Ok(Self {
            cfg,
            coordinator: Coordinator::new(),
            listener,
            events_tx,
            events_rx,
            broadcasts: 0,
        })
    }

    /// Returns the local address (after binding).
    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Number of broadcast ticks run so far.
    pub fn broadcasts(&self) -> u64 {
        self.broadcasts
    }

    /// Serves until `shutdown` resolves, then clears the session.
    pub async fn run_until<F>(&mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.cfg.broadcast_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.spawn_peer(stream, addr),
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
                Some(event) = self.events_rx.recv() => self.coordinator.handle(event),
                _ = ticker.tick() => self.broadcast_tick(),
            }
        }

        info!(
            peers = self.coordinator.peer_count(),
            participants = self.coordinator.table().len(),
            "Server shutting down"
        );
        self.coordinator.clear();
        Ok(())
    }

    /// One broadcast. Failures are logged; the loop keeps serving.
    fn broadcast_tick(&mut self) {
        self.broadcasts += 1;
        let delivered = match self.coordinator.broadcast() {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(tick = self.broadcasts, error = %e, "State broadcast failed");
                return;
            }
        };
        if self.broadcasts % 600 == 0 {
            debug!(
                tick = self.broadcasts,
                delivered,
                participants = self.coordinator.table().len(),
                "State broadcast"
            );
        }
    }

    fn spawn_peer(&self, stream: TcpStream, addr: SocketAddr) {
        let conn = ConnectionId::new_unique();
        let events = self.events_tx.clone();
        tokio::spawn(serve_peer(stream, addr, conn, events));
    }
}

/// Runs one connection: handshake, then forward inbound frames until the peer
/// goes away. Outbound frames are written by a separate writer task.
async fn serve_peer(
    stream: TcpStream,
    addr: SocketAddr,
    conn: ConnectionId,
    events: mpsc::UnboundedSender<PeerEvent>,
) {
    let (writer, mut reader) = match MessageConn::accept(stream).await {
        Ok(ws) => ws.split(),
        Err(e) => {
            warn!(%addr, error = %e, "Handshake failed");
            return;
        }
    };

    let (outbox, queued) = Outbox::channel(OUTBOX_CAPACITY);
    let writer = spawn_writer(writer, queued);
    if events.send(PeerEvent::Connected { conn, outbox }).is_err() {
        writer.abort();
        return;
    }
    info!(?conn, %addr, "Peer connected");

    loop {
        match reader.recv_text().await {
            Ok(Some(raw)) => {
                if events.send(PeerEvent::Message { conn, raw }).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(?conn, error = %e, "Peer read failed");
                break;
            }
        }
    }

    // The coordinator drops the outbox on this event, which ends the writer.
    let _ = events.send(PeerEvent::Disconnected { conn });
    info!(?conn, %addr, "Peer disconnected");
}

/// Helper for tests: bind to an ephemeral port.
pub async fn bind_ephemeral(broadcast_hz: u32) -> anyhow::Result<(SyncServer, SyncConfig)> {
    let cfg = SyncConfig {
        server_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).to_string(),
        broadcast_hz,
        ..Default::default()
    };
    let mut server = SyncServer::bind(cfg).await?;
    server.cfg.server_addr = server.local_addr()?.to_string();
    let cfg = server.cfg.clone();
    Ok((server, cfg))
}
