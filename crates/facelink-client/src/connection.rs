//! Connection lifecycle for the persistent frame channel.
//!
//! ```text
//! Disconnected ──begin_connect──► Connecting ──on_opened(Ok)──► Connected
//!      ▲                              │                             │
//!      └────── on_opened(Err) ────────┘        on_lost (close / error)
//!      └────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is the only place [`ConnectionState`] changes. Opening is split into
//! [`ConnectionManager::begin_connect`] and [`ConnectionManager::on_opened`] so
//! the owner can await the handshake without blocking other events.

use std::sync::Arc;

use bytes::Bytes;
use facelink_core::{ConnectionState, TransportError};
use facelink_transport::{ChannelConnector, ChannelEvent, ChannelPair, FrameSink};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// A pending channel open, to be awaited off the owner's task.
pub struct ConnectAttempt {
    generation: u64,
    url: String,
    connector: Arc<dyn ChannelConnector>,
}

impl ConnectAttempt {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub async fn run(self) -> (u64, Result<ChannelPair, TransportError>) {
        let result = self.connector.open(&self.url).await;
        (self.generation, result)
    }
}

pub struct ConnectionManager {
    connector: Arc<dyn ChannelConnector>,
    url: String,
    state: ConnectionState,
    sink: Option<Box<dyn FrameSink>>,
    /// Bumped whenever a pending open must be discarded.
    generation: u64,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn ChannelConnector>, url: impl Into<String>) -> Self {
        Self {
            connector,
            url: url.into(),
            state: ConnectionState::Disconnected,
            sink: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a frame can be sent right now.
    pub fn is_open(&self) -> bool {
        self.state.is_connected() && self.sink.as_ref().is_some_and(|s| s.is_open())
    }

    /// Start connecting. `None` when already connected or connecting.
    pub fn begin_connect(&mut self) -> Option<ConnectAttempt> {
        if self.state != ConnectionState::Disconnected {
            debug!("connect ignored: channel is {}", self.state);
            return None;
        }
        self.generation += 1;
        self.state = ConnectionState::Connecting;
        info!("Connecting to {}", self.url);
        Some(ConnectAttempt {
            generation: self.generation,
            url: self.url.clone(),
            connector: Arc::clone(&self.connector),
        })
    }

    /// Complete an open. Returns the inbound event stream once connected,
    /// `Ok(None)` for an attempt that was abandoned meanwhile.
    pub fn on_opened(
        &mut self,
        generation: u64,
        result: Result<ChannelPair, TransportError>,
    ) -> Result<Option<mpsc::Receiver<ChannelEvent>>, TransportError> {
        if generation != self.generation || self.state != ConnectionState::Connecting {
            if let Ok(mut pair) = result {
                debug!("closing abandoned channel (generation {})", generation);
                pair.sink.close();
            }
            return Ok(None);
        }
        match result {
            Ok(ChannelPair { sink, events }) => {
                self.sink = Some(sink);
                self.state = ConnectionState::Connected;
                info!("Channel connected");
                Ok(Some(events))
            }
            Err(e) => {
                warn!("Channel open failed: {}", e);
                self.state = ConnectionState::Disconnected;
                Err(e)
            }
        }
    }

    /// Request closure. A pending open is abandoned at once; an open channel
    /// becomes `Disconnected` when its close is observed via [`Self::on_lost`].
    pub fn disconnect(&mut self) {
        match self.state {
            ConnectionState::Connected => {
                if let Some(sink) = self.sink.as_mut() {
                    info!("Closing channel");
                    sink.close();
                }
            }
            ConnectionState::Connecting => {
                self.generation += 1;
                self.state = ConnectionState::Disconnected;
                info!("Pending connect abandoned");
            }
            ConnectionState::Disconnected => {}
        }
    }

    /// The channel closed (either side) or failed.
    pub fn on_lost(&mut self, reason: Option<&str>) {
        match reason {
            Some(reason) => warn!("Channel lost: {}", reason),
            None => info!("Channel closed"),
        }
        self.sink = None;
        self.generation += 1;
        self.state = ConnectionState::Disconnected;
    }

    pub fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if !self.state.is_connected() {
            return Err(TransportError::NotConnected);
        }
        match self.sink.as_mut() {
            Some(sink) => sink.try_send(frame),
            None => Err(TransportError::NotConnected),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records sent frames; can be told to fail sends.
    #[derive(Clone, Default)]
    pub(crate) struct SinkSpy {
        pub sent: Arc<Mutex<Vec<Bytes>>>,
        pub closed: Arc<Mutex<bool>>,
        pub fail_sends: Arc<Mutex<bool>>,
    }

    impl SinkSpy {
        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    struct SpySink(SinkSpy);

    impl FrameSink for SpySink {
        fn try_send(&mut self, frame: Bytes) -> Result<(), TransportError> {
            if *self.0.fail_sends.lock().unwrap() {
                return Err(TransportError::ConnectionClosed);
            }
            self.0.sent.lock().unwrap().push(frame);
            Ok(())
        }

        fn close(&mut self) {
            *self.0.closed.lock().unwrap() = true;
        }

        fn is_open(&self) -> bool {
            !*self.0.closed.lock().unwrap()
        }
    }

    pub(crate) struct SpyConnector(pub SinkSpy);

    #[async_trait]
    impl ChannelConnector for SpyConnector {
        async fn open(&self, _url: &str) -> Result<ChannelPair, TransportError> {
            let (_tx, events) = mpsc::channel(8);
            Ok(ChannelPair { sink: Box::new(SpySink(self.0.clone())), events })
        }
    }

    pub(crate) fn spy_pair(spy: &SinkSpy) -> ChannelPair {
        let (_tx, events) = mpsc::channel(8);
        ChannelPair { sink: Box::new(SpySink(spy.clone())), events }
    }

    /// A manager already in the `Connected` state.
    pub(crate) fn connected(spy: &SinkSpy) -> ConnectionManager {
        let mut conn = ConnectionManager::new(Arc::new(SpyConnector(spy.clone())), "ws://test/ws");
        let attempt = conn.begin_connect().unwrap();
        conn.on_opened(attempt.generation(), Ok(spy_pair(spy))).unwrap();
        conn
    }

    #[test]
    fn connect_transitions_through_connecting() {
        let spy = SinkSpy::default();
        let mut conn = ConnectionManager::new(Arc::new(SpyConnector(spy.clone())), "ws://test/ws");
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let attempt = conn.begin_connect().expect("attempt");
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert!(conn.begin_connect().is_none());

        let events = conn.on_opened(attempt.generation(), Ok(spy_pair(&spy))).unwrap();
        assert!(events.is_some());
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(conn.is_open());
        assert!(conn.begin_connect().is_none(), "connect is a no-op when connected");
    }

    #[test]
    fn failed_open_returns_to_disconnected() {
        let spy = SinkSpy::default();
        let mut conn = ConnectionManager::new(Arc::new(SpyConnector(spy)), "ws://test/ws");
        let attempt = conn.begin_connect().unwrap();
        let err = conn
            .on_opened(attempt.generation(), Err(TransportError::ConnectionClosed))
            .unwrap_err();
        assert_eq!(err, TransportError::ConnectionClosed);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_while_connecting_abandons_the_open() {
        let spy = SinkSpy::default();
        let mut conn = ConnectionManager::new(Arc::new(SpyConnector(spy.clone())), "ws://test/ws");
        let attempt = conn.begin_connect().unwrap();
        conn.disconnect();
        assert_eq!(conn.state(), ConnectionState::Disconnected);

        let events = conn.on_opened(attempt.generation(), Ok(spy_pair(&spy))).unwrap();
        assert!(events.is_none());
        assert!(*spy.closed.lock().unwrap(), "late channel is closed");
        assert_eq!(conn.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn disconnect_waits_for_close_event() {
        let spy = SinkSpy::default();
        let mut conn = connected(&spy);
        conn.disconnect();
        assert!(*spy.closed.lock().unwrap());
        assert_eq!(conn.state(), ConnectionState::Connected);
        assert!(!conn.is_open());

        conn.on_lost(None);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.send(Bytes::from_static(b"x")), Err(TransportError::NotConnected));
    }

    #[test]
    fn transport_error_collapses_to_disconnected() {
        let spy = SinkSpy::default();
        let mut conn = connected(&spy);
        conn.on_lost(Some("reset by peer"));
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert!(!conn.is_open());
    }
}
