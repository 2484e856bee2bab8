//! Transport collaborator contract.
//!
//! A transport owns one full-duplex streaming connection at a time and
//! pushes typed notifications onto an [`EventSink`].  Every event is tagged
//! with the generation of the connection that produced it so the event
//! router can ignore notifications from a superseded connection.

use std::time::Duration;

use al_domain::error::Error;
use tokio::sync::mpsc;

use crate::types::MessageKind;

/// Notification raised by the transport layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    /// One frame of data.  Text frames may carry a fragment of a larger
    /// message; binary frames are complete units.
    Data {
        kind: MessageKind,
        payload: Vec<u8>,
    },
    Disconnected,
    Error(String),
    Closed,
    /// The read side ended without a close frame.
    Finished,
}

/// Where a transport delivers notifications for one connection.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Deliver `event`.  Returns `false` once the router has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransportError {
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("connection closed")]
    Closed,
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        let msg = e.to_string();
        match e {
            TransportError::Timeout(_) => Error::Timeout(msg),
            _ => Error::Network(msg),
        }
    }
}

/// A full-duplex streaming connection.
///
/// Implementations must be safe to call from the lifecycle manager and the
/// outbound worker concurrently.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Set the URI the next `open` connects to.
    fn set_target(&self, uri: &str);

    /// Open the connection.  On success a `Connected` event has been (or
    /// will be) emitted on `events`, followed by data and a final
    /// disconnect-class event.
    async fn open(&self, events: EventSink) -> Result<(), TransportError>;

    /// Transmit one message with the opcode matching `kind`.
    async fn send(
        &self,
        kind: MessageKind,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError>;

    /// Initiate a graceful close, waiting at most `timeout`.
    async fn close(&self, timeout: Duration) -> Result<(), TransportError>;

    /// Tear the connection down immediately.  Idempotent.
    async fn stop(&self);

    fn is_connected(&self) -> bool;
}
