//! Transport event router.
//!
//! Drains transport notifications, drives the handshake state machine and
//! turns text fragments into complete inbound messages.  The router is the
//! only owner of the reassembly buffer.

use std::sync::Arc;

use al_protocol::ControlMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::outbound::OutboundMessage;
use crate::queue::PushError;
use crate::reassembly::{Reassembler, Reassembly};
use crate::session::{SessionHandle, Shared};
use crate::transport::TransportEvent;
use crate::types::{AgentEvent, HandshakeState, MessageKind};

pub(crate) struct EventRouter {
    shared: Arc<Shared>,
    events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    reassembler: Reassembler,
}

impl EventRouter {
    pub fn new(shared: Arc<Shared>, events: mpsc::UnboundedReceiver<(u64, TransportEvent)>) -> Self {
        let reassembler = Reassembler::new(shared.connection.max_reassembly_bytes);
        Self {
            shared,
            events,
            reassembler,
        }
    }

    pub async fn run(mut self, stop: CancellationToken) {
        tracing::debug!("event router started");
        loop {
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                next = self.events.recv() => next,
            };
            match next {
                Some((generation, event)) => self.dispatch(generation, event).await,
                None => break,
            }
        }
        tracing::debug!("event router stopped");
    }

    async fn dispatch(&mut self, generation: u64, event: TransportEvent) {
        let current = self.shared.state.lock().generation;
        if generation != current {
            tracing::debug!(
                generation,
                current,
                event = event_name(&event),
                "ignoring event from superseded connection"
            );
            return;
        }

        match event {
            TransportEvent::Connected => self.on_connected(generation).await,
            TransportEvent::Data {
                kind: MessageKind::Text,
                payload,
            } => self.on_text(&payload).await,
            TransportEvent::Data {
                kind: MessageKind::Binary,
                payload,
            } => {
                tracing::trace!(bytes = payload.len(), "binary frame");
                self.notify(AgentEvent::Audio(payload));
            }
            TransportEvent::Error(reason) => {
                tracing::error!(error = %reason, "transport error");
                self.on_disconnected(generation);
            }
            other => {
                tracing::info!(event = event_name(&other), "transport disconnected");
                self.on_disconnected(generation);
            }
        }
    }

    async fn on_connected(&mut self, generation: u64) {
        let pending = {
            let state = self.shared.state.lock();
            (state.started && state.handshake == HandshakeState::NotStarted)
                .then(|| state.conversation_id.clone())
        };

        if let Some(conversation_id) = pending {
            self.send_handshake(generation, conversation_id.as_deref())
                .await;
        }

        {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return;
            }
            state.connected = true;
        }
        tracing::info!(generation, "transport connected");
        self.notify(AgentEvent::Connected);
    }

    /// Queue the handshake ahead of any application traffic.  This enqueue
    /// waits without bound; the message is tagged with `generation` so the
    /// outbound worker drops it if the connection is replaced meanwhile.
    async fn send_handshake(&self, generation: u64, conversation_id: Option<&str>) {
        {
            let state = self.shared.state.lock();
            if state.generation != generation || !state.started {
                tracing::debug!(generation, "connection superseded, handshake skipped");
                return;
            }
        }
        let handshake = ControlMessage::handshake(&self.shared.conversation, conversation_id);
        let json = match handshake.to_json() {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to build handshake");
                return;
            }
        };
        let message = OutboundMessage {
            kind: MessageKind::Text,
            payload: json.into_bytes(),
            generation,
        };
        if self.shared.outbound.push(message, None).await.is_err() {
            tracing::error!("outbound queue closed, handshake not sent");
            return;
        }

        let mut state = self.shared.state.lock();
        if state.generation == generation && state.handshake == HandshakeState::NotStarted {
            state.handshake = HandshakeState::AwaitingAcknowledgement;
            tracing::info!(
                resume = conversation_id.is_some(),
                mode = self.shared.conversation.mode.as_str(),
                "handshake queued"
            );
        }
    }

    async fn on_text(&mut self, fragment: &[u8]) {
        match self.reassembler.push(fragment) {
            Ok(Reassembly::Pending) => {
                tracing::trace!(
                    fragment = fragment.len(),
                    buffered = self.reassembler.len(),
                    "awaiting more fragments"
                );
            }
            Ok(Reassembly::Complete(message)) => {
                let bytes = message.len();
                tracing::debug!(bytes, "inbound message complete");
                let wait = self.shared.connection.inbound_enqueue_wait();
                match self.shared.inbound.push(message, Some(wait)).await {
                    Ok(()) => {}
                    Err(PushError::Full(_)) => {
                        tracing::warn!(bytes, "inbound queue full, dropping message");
                    }
                    Err(PushError::Closed(_)) => {
                        tracing::error!(bytes, "inbound queue closed, dropping message");
                    }
                }
            }
            Ok(Reassembly::Overflow { discarded }) => {
                tracing::warn!(
                    discarded,
                    max = self.shared.connection.max_reassembly_bytes,
                    "reassembly buffer overflow, discarding buffered data"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "reassembly buffer could not grow, discarding");
                self.reassembler.reset();
            }
        }
    }

    fn on_disconnected(&mut self, generation: u64) {
        {
            let mut state = self.shared.state.lock();
            if state.generation != generation {
                return;
            }
            state.connected = false;
            state.started = false;
            state.handshake = HandshakeState::NotStarted;
        }
        self.reassembler.reset();
        self.notify(AgentEvent::Disconnected);
    }

    fn notify(&self, event: AgentEvent) {
        let handle = SessionHandle::from_shared(self.shared.clone());
        self.shared.consumer.on_event(&handle, event);
    }
}

fn event_name(event: &TransportEvent) -> &'static str {
    match event {
        TransportEvent::Connected => "connected",
        TransportEvent::Data { .. } => "data",
        TransportEvent::Disconnected => "disconnected",
        TransportEvent::Error(_) => "error",
        TransportEvent::Closed => "closed",
        TransportEvent::Finished => "finished",
    }
}
