//! Networking primitives.
//!
//! Goals:
//! - Define the two wire messages exchanged between clients and the coordinator.
//! - Keep the payloads a closed tagged union, with unknown tags tolerated.
//! - Provide a WebSocket text channel used by both sides.
//! - Never let a slow peer stall the sender: outbound frames go through a
//!   bounded [`Outbox`] and are skipped when it is full.
//!
//! Every frame is a JSON object carrying a `type` field:
//!
//! ```text
//! client -> coordinator  {"type":"update","id":"<id>","x":1.0,"y":2.0}
//! coordinator -> client  {"type":"state","players":{"<id>":{"x":1.0,"y":2.0}}}
//! ```

use std::{collections::BTreeMap, time::Duration};

use anyhow::Context;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, Stream, StreamExt,
};
use serde::{Deserialize, Serialize};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time,
};
use tokio_tungstenite::{
    accept_async, connect_async,
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, trace};

/// Frames that may wait in an [`Outbox`] before new ones are skipped.
pub const OUTBOX_CAPACITY: usize = 8;

use crate::{id::ParticipantId, math::Position};

/// Full canonical state as carried by a `state` message.
///
/// Ordered so that encoded snapshots are stable for a given table.
pub type Snapshot = BTreeMap<ParticipantId, Position>;

/// Message envelope, tagged by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NetMsg {
    /// Client -> coordinator: current position of the sender's entity.
    Update { id: ParticipantId, x: f64, y: f64 },
    /// Coordinator -> client: every known participant and its position.
    State { players: Snapshot },
    /// Any other `type` value. Receivers ignore it.
    #[serde(other)]
    Unknown,
}

impl NetMsg {
    pub fn update(id: ParticipantId, pos: Position) -> Self {
        NetMsg::Update {
            id,
            x: pos.x,
            y: pos.y,
        }
    }

    pub fn state(players: Snapshot) -> Self {
        NetMsg::State { players }
    }
}

/// What a receiver did with one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Applied,
    /// Well-formed but not meant for this receiver, or an unknown tag.
    Ignored,
    /// Failed to decode and was discarded.
    Dropped,
}

pub fn encode(msg: &NetMsg) -> anyhow::Result<String> {
    serde_json::to_string(msg).context("serialize msg")
}

pub fn decode(raw: &str) -> anyhow::Result<NetMsg> {
    serde_json::from_str(raw).context("deserialize msg")
}

/// One WebSocket connection carrying JSON text frames.
pub struct MessageConn<S> {
    stream: WebSocketStream<S>,
}

impl MessageConn<TcpStream> {
    /// Performs the server side of the WebSocket handshake.
    pub async fn accept(stream: TcpStream) -> anyhow::Result<Self> {
        stream.set_nodelay(true).context("tcp nodelay")?;
        let stream = accept_async(stream).await.context("websocket accept")?;
        Ok(Self { stream })
    }
}

impl MessageConn<MaybeTlsStream<TcpStream>> {
    /// Dials a coordinator at a `ws://` URL.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let (stream, _response) = connect_async(url)
            .await
            .with_context(|| format!("websocket connect {url}"))?;
        Ok(Self { stream })
    }
}

impl<S> MessageConn<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn send(&mut self, msg: &NetMsg) -> anyhow::Result<()> {
        let text = encode(msg)?;
        self.send_text(text).await
    }

    pub async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        trace!(len = text.len(), "ws send");
        self.stream
            .send(Message::Text(text))
            .await
            .context("websocket send")
    }

    /// Reads the next data frame as text. See [`MessageReader::recv_text`].
    pub async fn recv_text(&mut self) -> anyhow::Result<Option<String>> {
        next_text(&mut self.stream).await
    }

    /// Like [`recv_text`](Self::recv_text) but gives up after `timeout`.
    ///
    /// The outer `Option` is `None` on timeout.
    pub async fn recv_text_timeout(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<Option<Option<String>>> {
        match time::timeout(timeout, self.recv_text()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Splits into independently owned write and read halves.
    pub fn split(self) -> (MessageWriter<S>, MessageReader<S>) {
        let (sink, stream) = self.stream.split();
        (MessageWriter { sink }, MessageReader { stream })
    }

    /// Sends a close frame. Errors from an already-closed peer are ignored.
    pub async fn close(&mut self) -> anyhow::Result<()> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e).context("websocket close"),
        }
    }
}

async fn next_text<St>(stream: &mut St) -> anyhow::Result<Option<String>>
where
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return Ok(Some(text)),
            Some(Ok(Message::Binary(data))) => {
                return Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "websocket close received");
                return Ok(None);
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed))
            | None => return Ok(None),
            Some(Err(e)) => return Err(e).context("websocket recv"),
        }
    }
}

/// Read half of a split [`MessageConn`].
pub struct MessageReader<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> MessageReader<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Reads the next data frame as text.
    ///
    /// Returns `Ok(None)` once the peer has closed the connection. Binary frames
    /// are decoded lossily; control frames are consumed here.
    pub async fn recv_text(&mut self) -> anyhow::Result<Option<String>> {
        next_text(&mut self.stream).await
    }

    /// The outer `Option` is `None` on timeout.
    pub async fn recv_text_timeout(
        &mut self,
        timeout: Duration,
    ) -> anyhow::Result<Option<Option<String>>> {
        match time::timeout(timeout, self.recv_text()).await {
            Ok(res) => res.map(Some),
            Err(_) => Ok(None),
        }
    }
}

/// Write half of a split [`MessageConn`].
pub struct MessageWriter<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> MessageWriter<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub async fn send_text(&mut self, text: String) -> anyhow::Result<()> {
        trace!(len = text.len(), "ws send");
        self.sink
            .send(Message::Text(text))
            .await
            .context("websocket send")
    }

    pub async fn close(&mut self) -> anyhow::Result<()> {
        match self.sink.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e).context("websocket close"),
        }
    }
}

/// Result of offering a frame to an [`Outbox`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Queued,
    /// The queue was full; the frame was discarded.
    Skipped,
    /// The writer is gone.
    Closed,
}

/// Bounded queue of outbound frames for one connection.
///
/// Offering never waits. Dropping every `Outbox` for a connection makes its
/// writer task close the socket.
#[derive(Debug, Clone)]
pub struct Outbox {
    tx: mpsc::Sender<String>,
}

impl Outbox {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub fn offer(&self, payload: String) -> Delivery {
        match self.tx.try_send(payload) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => Delivery::Skipped,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Drains `queued` into `writer` until every sender is dropped or a write
/// fails, then closes the socket.
pub fn spawn_writer<S>(
    mut writer: MessageWriter<S>,
    mut queued: mpsc::Receiver<String>,
) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(payload) = queued.recv().await {
            if let Err(e) = writer.send_text(payload).await {
                debug!(error = %e, "Writer stopped");
                return;
            }
        }
        let _ = writer.close().await;
    })
}
