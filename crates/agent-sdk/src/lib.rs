//! `al-agent-sdk`: connectivity core for embedded conversational-agent
//! clients.
//!
//! An agent session keeps one authenticated, full-duplex WebSocket
//! connection to a remote agent and turns the fragmented frames it carries
//! into whole application messages.  Three tasks share the session: the
//! event router (fed by the transport), the inbound worker and the outbound
//! worker.
//!
//! # Architecture
//!
//! ```text
//!             ┌──────────────────────────────────────────────────────┐
//!             │  AgentSession                                        │
//!  start ───▶ │  TokenManager ──▶ Transport::open(uri)               │
//!  stop       │                        │ (generation, TransportEvent) │
//!             │                        ▼                             │
//!             │                  EventRouter ── Reassembler          │
//!             │   handshake ◀───┘   │    │                           │
//!             │       │             │    └──▶ inbound queue (10)     │
//!             │       ▼             │             │                  │
//!  send_* ──▶ │  outbound queue (35)│        InboundWorker ──▶ on_message
//!             │       │             └──▶ on_event (connected,        │
//!             │  OutboundWorker             disconnected, audio)     │
//!             │       │                                              │
//!             │       └──▶ Transport::send                           │
//!             └──────────────────────────────────────────────────────┘
//! ```
//!
//! # Connection flow
//!
//! 1. `start` exchanges the refresh credential for an access token (cached
//!    for one hour less a safety margin) and opens
//!    `wss://{host}/user/agents/{agent_id}/ws?token={access_token}`.
//! 2. On `Connected` the router queues the `conversation_init` handshake.
//! 3. The consumer spots the acknowledgement (see
//!    [`al_protocol::as_handshake_ack`]) and calls
//!    [`SessionHandle::acknowledge_handshake`].
//! 4. Any disconnect resets the session to not-started.  Reconnecting is
//!    the caller's decision; [`ReconnectBackoff`] helps pace it.

pub mod builder;
pub mod consumer;
mod inbound;
mod outbound;
mod queue;
pub mod reassembly;
pub mod reconnect;
pub mod registry;
mod router;
pub mod session;
pub mod shutdown;
pub mod token;
pub mod transport;
pub mod types;
pub mod ws;

#[cfg(test)]
mod testing;

// ── Re-exports for ergonomic imports ─────────────────────────────────

pub use builder::AgentSessionBuilder;
pub use consumer::MessageConsumer;
pub use reconnect::{ReconnectBackoff, ReconnectSchedule};
pub use registry::{LocalTool, ToolRegistry};
pub use session::{AgentSession, SessionHandle};
pub use token::{CredentialService, HttpCredentialService, TokenManager};
pub use transport::{EventSink, Transport, TransportError, TransportEvent};
pub use types::{AgentEvent, HandshakeState, MessageKind, ToolContext, ToolError, ToolResult};
pub use ws::WsTransport;

// Re-export the shared crates so callers need only this one.
pub use al_domain::config::AgentConfig;
pub use al_domain::error::{Error, Result};
pub use al_protocol::{as_handshake_ack, HandshakeAck};
