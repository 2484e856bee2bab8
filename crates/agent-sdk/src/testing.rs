//! Test doubles for the collaborator traits.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use al_domain::error::{Error, Result};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::consumer::MessageConsumer;
use crate::session::SessionHandle;
use crate::token::CredentialService;
use crate::transport::{EventSink, Transport, TransportError, TransportEvent};
use crate::types::{AgentEvent, MessageKind};

/// Poll `cond` every 5 ms for up to 2 s.
pub(crate) async fn wait_until(cond: impl Fn() -> bool) -> bool {
    for _ in 0..400 {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    cond()
}

// ── Transport ────────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MockTransport {
    auto_connect: bool,
    connected: AtomicBool,
    fail_open: AtomicBool,
    echo_close: AtomicBool,
    failing_sends: AtomicUsize,
    target: Mutex<String>,
    sink: Mutex<Option<EventSink>>,
    sent: Mutex<Vec<(MessageKind, Vec<u8>)>>,
    opens: AtomicUsize,
    closes: AtomicUsize,
    stops: AtomicUsize,
}

impl MockTransport {
    /// Reports `Connected` as soon as it is opened.
    pub fn new() -> Self {
        Self {
            auto_connect: true,
            ..Self::default()
        }
    }

    /// Opens without ever reporting `Connected`.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn fail_next_open(&self) {
        self.fail_open.store(true, Ordering::SeqCst);
    }

    /// Make `close` report `Closed` on the current connection and then
    /// linger, like a peer answering the close frame.
    pub fn echo_close(&self) {
        self.echo_close.store(true, Ordering::SeqCst);
    }

    pub fn fail_sends(&self, n: usize) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Push an event as if it came from the current connection.
    pub fn emit(&self, event: TransportEvent) {
        let sink = self.sink.lock().clone().expect("transport was never opened");
        assert!(sink.emit(event));
    }

    pub fn emit_text(&self, text: &str) {
        self.emit(TransportEvent::Data {
            kind: MessageKind::Text,
            payload: text.as_bytes().to_vec(),
        });
    }

    pub fn sent(&self) -> Vec<(MessageKind, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn target(&self) -> String {
        self.target.lock().clone()
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    fn set_target(&self, uri: &str) {
        *self.target.lock() = uri.to_owned();
    }

    async fn open(&self, events: EventSink) -> std::result::Result<(), TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open.swap(false, Ordering::SeqCst) {
            return Err(TransportError::Connect("refused".into()));
        }
        if self.auto_connect {
            self.connected.store(true, Ordering::SeqCst);
            events.emit(TransportEvent::Connected);
        }
        *self.sink.lock() = Some(events);
        Ok(())
    }

    async fn send(
        &self,
        kind: MessageKind,
        payload: &[u8],
        _timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        let failing = self.failing_sends.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_sends.store(failing - 1, Ordering::SeqCst);
            return Err(TransportError::Send("injected".into()));
        }
        self.sent.lock().push((kind, payload.to_vec()));
        Ok(payload.len())
    }

    async fn close(&self, _timeout: Duration) -> std::result::Result<(), TransportError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
        if self.echo_close.load(Ordering::SeqCst) {
            let sink = self.sink.lock().clone();
            if let Some(sink) = sink {
                sink.emit(TransportEvent::Closed);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        Ok(())
    }

    async fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ── Credentials ──────────────────────────────────────────────────────

/// Hands out `{prefix}-{n}` for the n-th exchange.
pub(crate) struct CountingCredentialService {
    prefix: String,
    calls: AtomicUsize,
    fail_next: AtomicBool,
    last_refresh_token: Mutex<Option<String>>,
}

impl CountingCredentialService {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_owned(),
            calls: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
            last_refresh_token: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn last_refresh_token(&self) -> Option<String> {
        self.last_refresh_token.lock().clone()
    }
}

#[async_trait::async_trait]
impl CredentialService for CountingCredentialService {
    async fn exchange(&self, refresh_token: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_refresh_token.lock() = Some(refresh_token.to_owned());
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Network("injected".into()));
        }
        Ok(format!("{}-{n}", self.prefix))
    }
}

// ── Consumers ────────────────────────────────────────────────────────

pub(crate) struct RecordingConsumer {
    messages: mpsc::UnboundedSender<String>,
    events: mpsc::UnboundedSender<AgentEvent>,
}

impl RecordingConsumer {
    pub fn new() -> (
        Arc<Self>,
        mpsc::UnboundedReceiver<String>,
        mpsc::UnboundedReceiver<AgentEvent>,
    ) {
        let (messages, messages_rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        (Arc::new(Self { messages, events }), messages_rx, events_rx)
    }
}

#[async_trait::async_trait]
impl MessageConsumer for RecordingConsumer {
    async fn on_message(&self, _session: &SessionHandle, message: String) {
        let _ = self.messages.send(message);
    }

    fn on_event(&self, _session: &SessionHandle, event: AgentEvent) {
        let _ = self.events.send(event);
    }
}

/// Never returns from `on_message`.
#[derive(Default)]
pub(crate) struct StuckConsumer {
    entered: AtomicBool,
}

impl StuckConsumer {
    pub fn entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl MessageConsumer for StuckConsumer {
    async fn on_message(&self, _session: &SessionHandle, _message: String) {
        self.entered.store(true, Ordering::SeqCst);
        std::future::pending::<()>().await;
    }
}

// ── HTTP ─────────────────────────────────────────────────────────────

/// Accept one HTTP request on an ephemeral port and answer with the raw
/// `response`.  Resolves to the request text.
pub(crate) async fn serve_http_once(response: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let origin = format!("http://{}", listener.local_addr().unwrap());
    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_http_request(&mut stream).await;
        stream.write_all(response.as_bytes()).await.unwrap();
        let _ = stream.shutdown().await;
        request
    });
    (origin, server)
}

async fn read_http_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let n = stream.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let body_len = text[..head_end]
                .lines()
                .filter_map(|line| line.split_once(':'))
                .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + body_len {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
