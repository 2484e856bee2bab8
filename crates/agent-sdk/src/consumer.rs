use crate::session::SessionHandle;
use crate::types::AgentEvent;

/// Receives everything the agent sends.
///
/// `on_message` runs on the inbound worker, one message at a time, in
/// arrival order.  `on_event` runs on the event router and must return
/// quickly; hand long work off to another task.
///
/// A consumer that recognises the handshake acknowledgement calls
/// [`SessionHandle::acknowledge_handshake`].
#[async_trait::async_trait]
pub trait MessageConsumer: Send + Sync + 'static {
    /// One complete, structurally valid JSON message.
    async fn on_message(&self, session: &SessionHandle, message: String);

    /// Connection notifications and binary (audio) payloads.
    fn on_event(&self, session: &SessionHandle, event: AgentEvent) {
        let _ = (session, event);
    }
}
