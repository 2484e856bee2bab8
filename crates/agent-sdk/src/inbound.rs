//! Inbound pipeline worker: hands reassembled messages to the consumer.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::consumer::MessageConsumer;
use crate::queue::BoundedQueue;
use crate::session::SessionHandle;

pub(crate) struct InboundWorker {
    pub queue: Arc<BoundedQueue<String>>,
    pub consumer: Arc<dyn MessageConsumer>,
    pub session: SessionHandle,
    pub poll_interval: Duration,
}

impl InboundWorker {
    pub async fn run(self, stop: CancellationToken) {
        tracing::debug!("inbound worker started");
        loop {
            if stop.is_cancelled() {
                break;
            }
            let next = tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                next = self.queue.pop(self.poll_interval) => next,
            };
            if let Some(message) = next {
                tracing::debug!(bytes = message.len(), "dispatching inbound message");
                self.consumer.on_message(&self.session, message).await;
            }
        }
        tracing::debug!("inbound worker stopped");
    }
}
