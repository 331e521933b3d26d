//! Client implementation.
//!
//! The client maintains:
//! - One WebSocket connection to the coordinator, split into a read half and
//!   a writer task fed through a bounded [`Outbox`]
//! - A [`Reconciler`] holding the controlled entity and remote proxies
//! - A tick counter for the fixed-rate simulation loop
//!
//! Ticks and inbound frames never run concurrently: [`SyncClient::run_until`]
//! drives both from a single `select!` loop. A tick never waits on the
//! network; when the writer falls behind, that tick's update is skipped.

use std::{future::Future, time::Duration};

use anyhow::Context;
use sync_shared::{
    config::SyncConfig,
    id::IdGenerator,
    net::{
        encode, spawn_writer, Delivery, Disposition, MessageConn, MessageReader, Outbox,
        OUTBOX_CAPACITY,
    },
    visual::VisualBackend,
};
use tokio::{
    net::TcpStream,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tokio_tungstenite::MaybeTlsStream;
use tracing::{debug, info, trace, warn};

use crate::{input::InputState, reconciler::Reconciler};

/// How long [`SyncClient::close`] waits for queued frames and the close frame.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Client connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Connected,
    /// The coordinator closed the connection or it failed.
    Disconnected,
}

/// High-level sync client.
pub struct SyncClient<V> {
    pub state: ClientState,
    pub reconciler: Reconciler<V>,
    reader: MessageReader<MaybeTlsStream<TcpStream>>,
    /// Dropped on close so the writer task sends a close frame and exits.
    outbox: Option<Outbox>,
    writer: Option<JoinHandle<()>>,
    cfg: SyncConfig,
    tick: u64,
    skipped: u64,
}

impl<V: VisualBackend> SyncClient<V> {
    /// Connects to the coordinator and starts a session under a fresh id.
    pub async fn connect(
        cfg: &SyncConfig,
        ids: &mut impl IdGenerator,
        visuals: V,
    ) -> anyhow::Result<Self> {
        let url = cfg.server_url();
        info!(server = %url, "Connecting to coordinator");

        let (writer, reader) = MessageConn::connect(&url).await?.split();
        let (outbox, queued) = Outbox::channel(OUTBOX_CAPACITY);
        let writer = spawn_writer(writer, queued);

        let local_id = ids.generate();
        info!(participant = %local_id, "Connected to coordinator");

        Ok(Self {
            state: ClientState::Connected,
            reconciler: Reconciler::from_config(local_id, cfg, visuals),
            reader,
            outbox: Some(outbox),
            writer: Some(writer),
            cfg: cfg.clone(),
            tick: 0,
            skipped: 0,
        })
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Updates dropped because the outbound queue was full.
    pub fn skipped_updates(&self) -> u64 {
        self.skipped
    }

    /// Runs one simulation tick: moves the controlled entity and queues its
    /// position for the coordinator. No reply is expected and nothing here
    /// waits on the socket.
    pub fn tick(&mut self, input: InputState) -> anyhow::Result<()> {
        let dt = self.cfg.tick_interval().as_secs_f64();
        self.reconciler.apply_input(input, dt);
        self.tick += 1;

        let payload = encode(&self.reconciler.update_message()).context("encode update")?;
        let delivery = match &self.outbox {
            Some(outbox) => outbox.offer(payload),
            None => Delivery::Closed,
        };
        match delivery {
            Delivery::Queued => {}
            Delivery::Skipped => {
                self.skipped += 1;
                trace!(tick = self.tick, "Outbound queue full, update skipped");
            }
            Delivery::Closed => {
                self.mark_disconnected();
                anyhow::bail!("coordinator connection closed");
            }
        }
        Ok(())
    }

    /// Handles inbound frames for up to `timeout`.
    ///
    /// Returns how many snapshots were reconciled.
    pub async fn poll(&mut self, timeout: Duration) -> anyhow::Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut applied = 0;
        while self.state == ClientState::Connected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match self.reader.recv_text_timeout(remaining).await? {
                Some(Some(raw)) => {
                    if self.reconciler.on_message(&raw) == Disposition::Applied {
                        applied += 1;
                    }
                }
                Some(None) => self.mark_disconnected(),
                None => break,
            }
        }
        Ok(applied)
    }

    /// Ticks at the configured rate with input from `input`, handling inbound
    /// frames between ticks, until `shutdown` resolves or the connection ends.
    pub async fn run_until<F>(
        &mut self,
        mut input: impl FnMut(u64) -> InputState,
        shutdown: F,
    ) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.cfg.tick_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.state == ClientState::Connected {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let intent = input(self.tick);
                    if let Err(e) = self.tick(intent) {
                        warn!(error = %e, "Tick failed");
                    }
                }
                frame = self.reader.recv_text() => match frame {
                    Ok(Some(raw)) => {
                        self.reconciler.on_message(&raw);
                    }
                    Ok(None) => self.mark_disconnected(),
                    Err(e) => {
                        warn!(error = %e, "Connection error");
                        self.mark_disconnected();
                    }
                },
            }
        }
        Ok(())
    }

    /// Ends the session: closes the connection and destroys remote proxies.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        self.outbox = None;
        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(CLOSE_GRACE, writer).await.is_err() {
                debug!("Writer did not finish before close grace expired");
            }
        }
        self.state = ClientState::Disconnected;
        self.reconciler.clear();
        Ok(())
    }

    fn mark_disconnected(&mut self) {
        if self.state != ClientState::Disconnected {
            debug!(participant = %self.reconciler.local_id(), "Coordinator connection closed");
            self.state = ClientState::Disconnected;
        }
    }
}

impl<V> Drop for SyncClient<V> {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use sync_shared::visual::NullVisuals;
    use sync_shared::{id::RandomIdGenerator, math::Position};
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts one WebSocket client and then never reads from it.
    async fn silent_coordinator() -> anyhow::Result<SyncConfig> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let cfg = SyncConfig {
            server_addr: listener.local_addr()?.to_string(),
            ..Default::default()
        };
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            let _conn = MessageConn::accept(stream).await?;
            std::future::pending::<()>().await;
            Ok::<_, anyhow::Error>(())
        });
        Ok(cfg)
    }

    #[tokio::test]
    async fn tick_does_not_wait_on_a_coordinator_that_stops_reading() -> anyhow::Result<()> {
        let cfg = silent_coordinator().await?;
        let mut client =
            SyncClient::connect(&cfg, &mut RandomIdGenerator::seeded(9), NullVisuals).await?;

        // Enough updates to fill the socket buffers several times over.
        let ticks = 100_000u64;
        let walk = InputState {
            right: true,
            ..Default::default()
        };
        let finished = tokio::time::timeout(Duration::from_secs(10), async {
            for i in 0..ticks {
                client.tick(walk)?;
                if i % 256 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            Ok::<_, anyhow::Error>(())
        })
        .await;

        assert!(finished.is_ok(), "ticks stalled behind the socket");
        finished??;
        assert_eq!(client.tick_count(), ticks);
        assert!(client.skipped_updates() > 0);
        assert_eq!(client.reconciler.local_position(), Position::new(800.0, 100.0));
        assert_eq!(client.state, ClientState::Connected);
        Ok(())
    }

    #[tokio::test]
    async fn tick_after_close_reports_disconnect() -> anyhow::Result<()> {
        let cfg = silent_coordinator().await?;
        let mut client =
            SyncClient::connect(&cfg, &mut RandomIdGenerator::seeded(10), NullVisuals).await?;
        client.close().await?;
        assert!(client.tick(InputState::IDLE).is_err());
        assert_eq!(client.state, ClientState::Disconnected);
        Ok(())
    }
}
