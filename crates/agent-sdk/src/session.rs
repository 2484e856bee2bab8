//! Agent session: connection lifecycle, the public handle, and the tasks
//! that move data in and out.

use std::sync::Arc;
use std::time::Duration;

use al_domain::config::{AgentConfig, ConnectionConfig, ConversationConfig};
use al_domain::error::{Error, Result};
use al_protocol::ApiEndpoint;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer::MessageConsumer;
use crate::inbound::InboundWorker;
use crate::outbound::{OutboundMessage, OutboundWorker};
use crate::queue::{BoundedQueue, PushError};
use crate::registry::{LocalTool, ToolRegistry};
use crate::router::EventRouter;
use crate::shutdown::{stop_task, StopOutcome};
use crate::token::{CredentialService, TokenManager};
use crate::transport::{EventSink, Transport, TransportEvent};
use crate::types::{AgentEvent, HandshakeState, MessageKind};

/// Lifecycle fields shared by the control surface and the event router.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub agent_id: Option<String>,
    pub refresh_token: Option<String>,
    pub conversation_id: Option<String>,
    pub started: bool,
    pub connected: bool,
    pub handshake: HandshakeState,
    /// Bumped on every start and stop; events tagged with an older value
    /// are ignored.
    pub generation: u64,
}

pub(crate) struct Shared {
    pub conversation: ConversationConfig,
    pub connection: ConnectionConfig,
    pub endpoint: ApiEndpoint,
    pub state: Mutex<SessionState>,
    /// Serializes start / stop / set_identity / set_credential.
    ops: tokio::sync::Mutex<()>,
    pub tokens: TokenManager,
    pub transport: Arc<dyn Transport>,
    pub outbound: Arc<BoundedQueue<OutboundMessage>>,
    pub inbound: Arc<BoundedQueue<String>>,
    pub tools: RwLock<ToolRegistry>,
    pub consumer: Arc<dyn MessageConsumer>,
    pub events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl Shared {
    async fn start_locked(self: &Arc<Self>, resume_id: Option<&str>) -> Result<()> {
        self.conversation.validate()?;
        let resume_id = resume_id.map(copy_str).transpose()?;
        let (agent_id, refresh_token) = {
            let mut state = self.state.lock();
            if state.started {
                return Err(Error::InvalidState("session already started".into()));
            }
            let agent_id = state
                .agent_id
                .clone()
                .ok_or_else(|| Error::InvalidState("agent identity not set".into()))?;
            let refresh_token = state
                .refresh_token
                .clone()
                .ok_or_else(|| Error::InvalidState("refresh credential not set".into()))?;
            if let Some(id) = resume_id {
                state.conversation_id = Some(id);
            }
            (agent_id, refresh_token)
        };

        let access_token = self.tokens.ensure_access_token(&refresh_token).await?;
        let uri = self.endpoint.agent_ws_uri(&agent_id, &access_token);
        self.transport.set_target(&uri);

        let (generation, resuming) = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.started = true;
            state.connected = false;
            state.handshake = HandshakeState::NotStarted;
            (state.generation, state.conversation_id.is_some())
        };
        tracing::info!(
            agent_id = %agent_id,
            generation,
            resuming,
            "starting agent connection"
        );

        let sink = EventSink::new(generation, self.events_tx.clone());
        if let Err(e) = self.transport.open(sink).await {
            {
                let mut state = self.state.lock();
                if state.generation == generation {
                    state.started = false;
                    state.connected = false;
                    state.handshake = HandshakeState::NotStarted;
                    state.generation += 1;
                }
            }
            self.transport.stop().await;
            tracing::error!(agent_id = %agent_id, error = %e, "failed to open connection");
            return Err(Error::Network(format!("opening connection: {e}")));
        }
        Ok(())
    }

    async fn stop_locked(self: &Arc<Self>) -> Result<()> {
        // Reset before closing so events the transport emits while closing
        // carry a superseded generation.
        let was_connected = {
            let mut state = self.state.lock();
            if !state.started {
                return Ok(());
            }
            let was_connected = state.connected;
            state.started = false;
            state.connected = false;
            state.handshake = HandshakeState::NotStarted;
            state.generation += 1;
            was_connected
        };

        if was_connected {
            let grace = self.connection.close_timeout();
            match tokio::time::timeout(grace, self.transport.close(grace)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::debug!(error = %e, "graceful close failed"),
                Err(_) => tracing::debug!("graceful close timed out"),
            }
        }
        self.transport.stop().await;

        let dropped_out = self.outbound.purge().await;
        let dropped_in = self.inbound.purge().await;
        tracing::info!(
            outbound_dropped = dropped_out,
            inbound_dropped = dropped_in,
            "agent connection stopped"
        );

        if was_connected {
            let handle = SessionHandle::from_shared(self.clone());
            self.consumer.on_event(&handle, AgentEvent::Disconnected);
        }
        Ok(())
    }
}

/// Cheap, cloneable handle to a session.  Given to consumers and tools.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Shared>,
}

impl SessionHandle {
    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Queue a copy of `payload` for transmission.
    ///
    /// `wait` bounds how long to wait for room in the queue; `None` waits
    /// indefinitely and `Some(Duration::ZERO)` fails immediately when full.
    pub async fn enqueue(
        &self,
        kind: MessageKind,
        payload: &[u8],
        wait: Option<Duration>,
    ) -> Result<()> {
        if payload.is_empty() {
            return Err(Error::InvalidArgument("payload must not be empty".into()));
        }
        let generation = {
            let state = self.shared.state.lock();
            if !state.started {
                return Err(Error::InvalidState("session not started".into()));
            }
            state.generation
        };

        let mut copy = Vec::new();
        copy.try_reserve_exact(payload.len())?;
        copy.extend_from_slice(payload);

        let message = OutboundMessage {
            kind,
            payload: copy,
            generation,
        };
        match self.shared.outbound.push(message, wait).await {
            Ok(()) => Ok(()),
            Err(PushError::Full(message)) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    bytes = message.payload.len(),
                    "outbound queue full"
                );
                Err(Error::Timeout(format!(
                    "outbound queue full ({} entries)",
                    self.shared.outbound.capacity()
                )))
            }
            Err(PushError::Closed(_)) => Err(Error::InvalidState("outbound queue closed".into())),
        }
    }

    pub async fn send_text(&self, text: &str, wait: Option<Duration>) -> Result<()> {
        self.enqueue(MessageKind::Text, text.as_bytes(), wait).await
    }

    pub async fn send_binary(&self, payload: &[u8], wait: Option<Duration>) -> Result<()> {
        self.enqueue(MessageKind::Binary, payload, wait).await
    }

    /// Record that the agent acknowledged the handshake.
    pub fn acknowledge_handshake(&self) -> Result<()> {
        let mut state = self.shared.state.lock();
        if state.handshake != HandshakeState::AwaitingAcknowledgement {
            return Err(Error::InvalidState(format!(
                "no handshake awaiting acknowledgement ({:?})",
                state.handshake
            )));
        }
        state.handshake = HandshakeState::Complete;
        tracing::info!("handshake complete");
        Ok(())
    }

    /// Like [`acknowledge_handshake`](Self::acknowledge_handshake), also
    /// storing the conversation id issued by the agent so a later `start`
    /// can resume it.
    pub fn acknowledge_handshake_with(&self, conversation_id: &str) -> Result<()> {
        if conversation_id.is_empty() {
            return Err(Error::InvalidArgument("conversation id must not be empty".into()));
        }
        let id = copy_str(conversation_id)?;
        self.acknowledge_handshake()?;
        self.shared.state.lock().conversation_id = Some(id);
        Ok(())
    }

    pub fn handshake_state(&self) -> HandshakeState {
        self.shared.state.lock().handshake
    }

    pub fn is_started(&self) -> bool {
        self.shared.state.lock().started
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connected
    }

    pub fn agent_id(&self) -> Option<String> {
        self.shared.state.lock().agent_id.clone()
    }

    pub fn conversation_id(&self) -> Option<String> {
        self.shared.state.lock().conversation_id.clone()
    }

    // ── Local tools ──────────────────────────────────────────────────

    pub fn register_tool<T: LocalTool>(&self, name: &str, tool: T) -> Result<()> {
        self.shared.tools.write().register(name, tool)
    }

    pub fn register_tool_arc(&self, name: &str, tool: Arc<dyn LocalTool>) -> Result<()> {
        self.shared.tools.write().register_boxed(name, tool)
    }

    pub fn unregister_tool(&self, name: &str) -> bool {
        self.shared.tools.write().unregister(name)
    }

    pub fn lookup_tool(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.shared.tools.read().get(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.shared.tools.read().names()
    }
}

/// A spawned task and the signal that asks it to stop.
struct Worker {
    name: &'static str,
    handle: Option<JoinHandle<()>>,
    stop: CancellationToken,
}

impl Worker {
    fn spawn<F>(name: &'static str, root: &CancellationToken, run: impl FnOnce(CancellationToken) -> F) -> Self
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let stop = root.child_token();
        let handle = tokio::spawn(run(stop.clone()));
        Self {
            name,
            handle: Some(handle),
            stop,
        }
    }

    async fn shutdown(&mut self, grace: Duration) -> StopOutcome {
        stop_task(self.name, self.handle.take(), &self.stop, grace).await
    }
}

/// One agent session: owns the pipelines, the event router and the
/// connection lifecycle.
///
/// Create with [`AgentSessionBuilder`](crate::builder::AgentSessionBuilder)
/// or [`AgentSession::initialize`], from within a tokio runtime, and
/// release with [`AgentSession::deinitialize`].  Dropping a started session
/// only signals its tasks and stops the transport in the background.
pub struct AgentSession {
    handle: SessionHandle,
    root: CancellationToken,
    router: Worker,
    inbound: Worker,
    outbound: Worker,
}

impl AgentSession {
    /// Initialize a session with the HTTP credential service.
    ///
    /// Validates `config`, creates both queues and spawns the workers and
    /// the event router.  The transport is not touched until `start`.
    pub fn initialize(
        config: AgentConfig,
        transport: Arc<dyn Transport>,
        consumer: Arc<dyn MessageConsumer>,
    ) -> Result<Self> {
        crate::builder::AgentSessionBuilder::new(config)
            .transport(transport)
            .consumer(consumer)
            .build()
    }

    pub(crate) fn assemble(
        config: AgentConfig,
        endpoint: ApiEndpoint,
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialService>,
        consumer: Arc<dyn MessageConsumer>,
    ) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::InvalidState(
                "agent session must be initialized inside a tokio runtime".into(),
            ));
        }

        let AgentConfig {
            agent_id,
            refresh_token,
            conversation,
            connection,
            token,
        } = config;

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            endpoint,
            state: Mutex::new(SessionState {
                agent_id,
                refresh_token,
                ..SessionState::default()
            }),
            ops: tokio::sync::Mutex::new(()),
            tokens: TokenManager::new(credentials, &token),
            transport,
            outbound: Arc::new(BoundedQueue::new(connection.outbound_queue_capacity)),
            inbound: Arc::new(BoundedQueue::new(connection.inbound_queue_capacity)),
            tools: RwLock::new(ToolRegistry::new()),
            consumer,
            events_tx,
            conversation,
            connection,
        });

        let root = CancellationToken::new();
        let router = {
            let router = EventRouter::new(shared.clone(), events_rx);
            Worker::spawn("event_router", &root, |stop| router.run(stop))
        };
        let outbound = {
            let state_of = shared.clone();
            let worker = OutboundWorker {
                queue: shared.outbound.clone(),
                transport: shared.transport.clone(),
                current_generation: Arc::new(move || state_of.state.lock().generation),
                poll_interval: shared.connection.poll_interval(),
                send_timeout: shared.connection.send_timeout(),
            };
            Worker::spawn("outbound_worker", &root, |stop| worker.run(stop))
        };
        let inbound = {
            let worker = InboundWorker {
                queue: shared.inbound.clone(),
                consumer: shared.consumer.clone(),
                session: SessionHandle::from_shared(shared.clone()),
                poll_interval: shared.connection.poll_interval(),
            };
            Worker::spawn("inbound_worker", &root, |stop| worker.run(stop))
        };

        tracing::info!(
            mode = shared.conversation.mode.as_str(),
            endpoint = %shared.endpoint.host(),
            "agent session initialized"
        );

        Ok(Self {
            handle: SessionHandle::from_shared(shared),
            root,
            router,
            inbound,
            outbound,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    fn shared(&self) -> &Arc<Shared> {
        &self.handle.shared
    }

    /// Open the connection.  `resume_id` replaces any stored conversation
    /// id so the handshake resumes that conversation.
    ///
    /// Fails with `InvalidState` if already started or if the identity or
    /// credential is unset, and with `Network`/`Protocol` if the token
    /// exchange or the connection attempt fails.
    pub async fn start(&self, resume_id: Option<&str>) -> Result<()> {
        if matches!(resume_id, Some("")) {
            return Err(Error::InvalidArgument("resume id must not be empty".into()));
        }
        let _ops = self.shared().ops.lock().await;
        self.shared().start_locked(resume_id).await
    }

    /// Close the connection and drop everything still queued.  A no-op
    /// when not started.
    pub async fn stop(&self) -> Result<()> {
        let _ops = self.shared().ops.lock().await;
        self.shared().stop_locked().await
    }

    /// Replace the agent identity.  A changed identity on a started
    /// session reconnects without resuming the previous conversation.
    pub async fn set_identity(&self, agent_id: &str) -> Result<()> {
        if agent_id.is_empty() {
            return Err(Error::InvalidArgument("agent id must not be empty".into()));
        }
        let agent_id = copy_str(agent_id)?;
        let _ops = self.shared().ops.lock().await;

        let restart = {
            let mut state = self.shared().state.lock();
            if state.agent_id.as_deref() == Some(agent_id.as_str()) {
                return Ok(());
            }
            state.agent_id = Some(agent_id);
            state.conversation_id = None;
            state.started
        };

        if restart {
            tracing::info!("agent identity changed, reconnecting");
            self.shared().stop_locked().await?;
            self.shared().start_locked(None).await?;
        }
        Ok(())
    }

    /// Replace the refresh credential and forget the cached access token.
    /// A started session reconnects with the new credential.
    pub async fn set_credential(&self, refresh_token: &str) -> Result<()> {
        if refresh_token.is_empty() {
            return Err(Error::InvalidArgument("refresh credential must not be empty".into()));
        }
        let refresh_token = copy_str(refresh_token)?;
        let _ops = self.shared().ops.lock().await;

        let restart = {
            let mut state = self.shared().state.lock();
            state.refresh_token = Some(refresh_token);
            state.started
        };
        self.shared().tokens.invalidate();

        if restart {
            tracing::info!("refresh credential changed, reconnecting");
            self.shared().stop_locked().await?;
            self.shared().start_locked(None).await?;
        }
        Ok(())
    }

    /// Stop the connection, shut down the router and both workers, and
    /// release everything the session holds.
    pub async fn deinitialize(mut self) {
        if let Err(e) = self.stop().await {
            tracing::warn!(error = %e, "stop during deinitialize failed");
        }

        let connection = self.shared().connection.clone();
        self.router.shutdown(connection.router_exit_wait()).await;
        self.inbound.shutdown(connection.inbound_exit_wait()).await;
        self.outbound.shutdown(connection.outbound_exit_wait()).await;

        self.shared().outbound.purge().await;
        self.shared().inbound.purge().await;
        self.shared().tools.write().clear();
        tracing::info!("agent session deinitialized");
    }
}

impl Drop for AgentSession {
    fn drop(&mut self) {
        self.root.cancel();

        let shared = self.shared().clone();
        {
            let mut state = shared.state.lock();
            if !state.started {
                return;
            }
            state.started = false;
            state.connected = false;
            state.handshake = HandshakeState::NotStarted;
            state.generation += 1;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                tracing::warn!("agent session dropped while started, stopping transport");
                runtime.spawn(async move { shared.transport.stop().await });
            }
            Err(_) => tracing::warn!("agent session dropped while started outside a runtime"),
        }
    }
}

/// Copy `s`, reporting allocation failure instead of aborting.
fn copy_str(s: &str) -> Result<String> {
    let mut owned = String::new();
    owned.try_reserve_exact(s.len())?;
    owned.push_str(s);
    Ok(owned)
}
