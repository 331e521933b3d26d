//! Shared helpers for the socket-level tests.

use std::time::Duration;

use sync_client::SyncClient;
use sync_server::{server::bind_ephemeral, SyncServer};
use sync_shared::{config::SyncConfig, visual::VisualBackend};
use tokio::{sync::oneshot, task::JoinHandle};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A server running in a background task on an ephemeral port.
pub struct RunningServer {
    pub cfg: SyncConfig,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<SyncServer>>,
}

impl RunningServer {
    pub async fn start(broadcast_hz: u32) -> anyhow::Result<Self> {
        let (mut server, cfg) = bind_ephemeral(broadcast_hz).await?;
        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            server
                .run_until(async {
                    let _ = stopped.await;
                })
                .await?;
            Ok::<_, anyhow::Error>(server)
        });
        Ok(Self { cfg, stop, handle })
    }

    /// Stops the server and hands it back for inspection.
    pub async fn stop(self) -> anyhow::Result<SyncServer> {
        let _ = self.stop.send(());
        self.handle.await?
    }
}

/// Ticks `client` with idle input and polls until `done` holds or `rounds`
/// run out. Returns whether `done` was reached.
pub async fn tick_until<V, F>(
    client: &mut SyncClient<V>,
    rounds: usize,
    mut done: F,
) -> anyhow::Result<bool>
where
    V: VisualBackend,
    F: FnMut(&SyncClient<V>) -> bool,
{
    for _ in 0..rounds {
        if done(client) {
            return Ok(true);
        }
        client.tick(Default::default())?;
        client.poll(Duration::from_millis(20)).await?;
    }
    Ok(done(client))
}
