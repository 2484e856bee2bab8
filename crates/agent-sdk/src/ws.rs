//! [`Transport`] over tokio-tungstenite.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::transport::{EventSink, Transport, TransportError, TransportEvent};
use crate::types::MessageKind;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Read side of one open connection.
struct Link {
    alive: Arc<AtomicBool>,
    reader: JoinHandle<()>,
}

/// WebSocket transport.  Never reconnects on its own.
pub struct WsTransport {
    target: Mutex<String>,
    connect_timeout: Duration,
    sink: tokio::sync::Mutex<Option<WsSink>>,
    link: Mutex<Option<Link>>,
}

impl WsTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            target: Mutex::new(String::new()),
            connect_timeout,
            sink: tokio::sync::Mutex::new(None),
            link: Mutex::new(None),
        }
    }
}

#[async_trait::async_trait]
impl Transport for WsTransport {
    fn set_target(&self, uri: &str) {
        *self.target.lock() = uri.to_owned();
    }

    async fn open(&self, events: EventSink) -> Result<(), TransportError> {
        let uri = self.target.lock().clone();
        if uri.is_empty() {
            return Err(TransportError::Connect("no target URI set".into()));
        }
        tracing::info!(
            uri = %without_query(&uri),
            generation = events.generation(),
            "opening websocket"
        );

        let (ws, _response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(uri.as_str()))
                .await
                .map_err(|_| TransportError::Timeout(self.connect_timeout))?
                .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (sink, mut stream) = ws.split();
        *self.sink.lock().await = Some(sink);

        let alive = Arc::new(AtomicBool::new(true));
        events.emit(TransportEvent::Connected);

        let reader_alive = alive.clone();
        let reader = tokio::spawn(async move {
            let terminal = loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        events.emit(TransportEvent::Data {
                            kind: MessageKind::Text,
                            payload: text.into_bytes(),
                        });
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        events.emit(TransportEvent::Data {
                            kind: MessageKind::Binary,
                            payload: bytes,
                        });
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(?frame, "peer closed websocket");
                        break TransportEvent::Closed;
                    }
                    // Ping/Pong are answered by tungstenite.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                    None => break TransportEvent::Finished,
                }
            };
            reader_alive.store(false, Ordering::SeqCst);
            events.emit(terminal);
        });

        let previous = self.link.lock().replace(Link { alive, reader });
        if let Some(old) = previous {
            old.reader.abort();
        }
        Ok(())
    }

    async fn send(
        &self,
        kind: MessageKind,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<usize, TransportError> {
        let message = match kind {
            MessageKind::Text => {
                let text = std::str::from_utf8(payload)
                    .map_err(|e| TransportError::Send(format!("text payload is not UTF-8: {e}")))?;
                Message::Text(text.to_owned())
            }
            MessageKind::Binary => Message::Binary(payload.to_vec()),
        };

        let send = async {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
            sink.send(message)
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        };
        tokio::time::timeout(timeout, send)
            .await
            .map_err(|_| TransportError::Timeout(timeout))??;
        Ok(payload.len())
    }

    async fn close(&self, timeout: Duration) -> Result<(), TransportError> {
        let close = async {
            let mut guard = self.sink.lock().await;
            let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
            sink.send(Message::Close(None))
                .await
                .map_err(|e| TransportError::Send(e.to_string()))
        };
        tokio::time::timeout(timeout, close)
            .await
            .map_err(|_| TransportError::Timeout(timeout))?
    }

    async fn stop(&self) {
        let link = self.link.lock().take();
        if let Some(link) = link {
            link.alive.store(false, Ordering::SeqCst);
            link.reader.abort();
        }
        // Dropping the write half releases the socket.
        self.sink.lock().await.take();
    }

    fn is_connected(&self) -> bool {
        self.link
            .lock()
            .as_ref()
            .is_some_and(|link| link.alive.load(Ordering::SeqCst))
    }
}

/// Strip the query string so access tokens stay out of the logs.
fn without_query(uri: &str) -> &str {
    uri.split_once('?').map_or(uri, |(base, _)| base)
}
