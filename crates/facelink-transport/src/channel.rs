//! Persistent binary frame channel (WebSocket, client role).
//!
//! # Lifecycle
//!
//! ```text
//! 1. let pair = WsConnector.open(url).await?
//!       ├─ pair.sink:   Box<dyn FrameSink>  ← try_send(jpeg) / close()
//!       └─ pair.events: Receiver<ChannelEvent>
//! 2. events yields Frame(bytes) per processed frame from the server
//! 3. events yields Closed (either side) or Error(reason), then ends
//! ```
//!
//! One message carries one encoded image in each direction.

use async_trait::async_trait;
use bytes::Bytes;
use facelink_core::TransportError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Inbound channel events, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Frame(Bytes),
    Closed,
    Error(String),
}

/// Write side of an open channel.
pub trait FrameSink: Send {
    /// Queue one frame. Fails immediately if the channel is gone.
    fn try_send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Request closure; a `Closed` event follows.
    fn close(&mut self);

    fn is_open(&self) -> bool;
}

/// An opened channel: the write side plus its inbound event stream.
pub struct ChannelPair {
    pub sink: Box<dyn FrameSink>,
    pub events: mpsc::Receiver<ChannelEvent>,
}

#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<ChannelPair, TransportError>;
}

// ── WebSocket implementation ──────────────────────────────────────────────────

enum Outbound {
    Frame(Bytes),
    Close,
}

/// Opens `ws://` / `wss://` channels with tokio-tungstenite.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl ChannelConnector for WsConnector {
    async fn open(&self, url: &str) -> Result<ChannelPair, TransportError> {
        let (stream, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| TransportError::ConnectionFailed { reason: format!("{}: {}", url, e) })?;
        info!("Channel connected to {}", url);

        let (mut write, mut read) = stream.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);

        // Writer: drains queued frames until closed or the socket fails.
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(out) = out_rx.recv().await {
                match out {
                    Outbound::Frame(frame) => {
                        let len = frame.len();
                        if let Err(e) = write.send(Message::Binary(frame.to_vec())).await {
                            warn!("Channel send error: {}", e);
                            let _ = writer_events.send(ChannelEvent::Error(e.to_string())).await;
                            return;
                        }
                        debug!("Sent frame ({} bytes)", len);
                    }
                    Outbound::Close => {
                        debug!("Closing channel");
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }
                }
            }
        });

        // Reader: forwards binary messages until the socket ends.
        tokio::spawn(async move {
            loop {
                match read.next().await {
                    Some(Ok(Message::Binary(data))) => {
                        if event_tx.send(ChannelEvent::Frame(Bytes::from(data))).await.is_err() {
                            debug!("Event receiver dropped; stopping channel reader");
                            return;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        info!("Channel closed by peer ({:?})", frame);
                        let _ = event_tx.send(ChannelEvent::Closed).await;
                        return;
                    }
                    Some(Ok(other)) => {
                        debug!("Ignoring non-binary message ({} bytes)", other.len());
                    }
                    Some(Err(e)) => {
                        warn!("Channel receive error: {}", e);
                        let _ = event_tx.send(ChannelEvent::Error(e.to_string())).await;
                        return;
                    }
                    None => {
                        let _ = event_tx.send(ChannelEvent::Closed).await;
                        return;
                    }
                }
            }
        });

        Ok(ChannelPair { sink: Box::new(WsSink { out_tx }), events: event_rx })
    }
}

struct WsSink {
    out_tx: mpsc::UnboundedSender<Outbound>,
}

impl FrameSink for WsSink {
    fn try_send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        self.out_tx
            .send(Outbound::Frame(frame))
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&mut self) {
        let _ = self.out_tx.send(Outbound::Close);
    }

    fn is_open(&self) -> bool {
        !self.out_tx.is_closed()
    }
}
