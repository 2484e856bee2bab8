//! Core types shared by the pipelines, the router and the public API.

use tokio_util::sync::CancellationToken;

/// Payload kind of a WebSocket message; selects the transmit opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Text,
    Binary,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Binary => "binary",
        }
    }
}

/// Handshake progress of the current connection.
///
/// `NotStarted → AwaitingAcknowledgement` once the handshake is queued after
/// a connect notification, `AwaitingAcknowledgement → Complete` when the
/// consumer reports the acknowledgement, and back to `NotStarted` on any
/// disconnect, error, close or `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandshakeState {
    #[default]
    NotStarted,
    AwaitingAcknowledgement,
    Complete,
}

/// Out-of-band notifications delivered to
/// [`MessageConsumer::on_event`](crate::consumer::MessageConsumer::on_event).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    Connected,
    Disconnected,
    /// One complete binary unit (speech audio), bypassing reassembly.
    Audio(Vec<u8>),
}

/// Context provided to every local tool invocation.
#[derive(Clone, Debug)]
pub struct ToolContext {
    /// Correlation ID chosen by the agent for this call.
    pub call_id: String,
    pub tool_name: String,
    /// Cancelled when the caller gives up on the invocation.
    pub cancel: CancellationToken,
}

impl ToolContext {
    pub fn new(call_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            tool_name: tool_name.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Result type for tool handlers.
pub type ToolResult = Result<serde_json::Value, ToolError>;

/// Errors a local tool handler can return.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ToolError {
    #[error("invalid_args: {0}")]
    InvalidArgs(String),
    #[error("not_allowed: {0}")]
    NotAllowed(String),
    #[error("failed: {0}")]
    Failed(String),
    #[error("timeout: {0}")]
    Timeout(String),
    #[error("cancelled: {0}")]
    Cancelled(String),
    #[error("not_found: {0}")]
    NotFound(String),
}
