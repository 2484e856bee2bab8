//! Outbound pipeline worker: drains the outbound queue onto the transport.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::queue::BoundedQueue;
use crate::transport::Transport;
use crate::types::MessageKind;

/// One owned message waiting to be transmitted.
#[derive(Debug)]
pub(crate) struct OutboundMessage {
    pub kind: MessageKind,
    pub payload: Vec<u8>,
    /// Connection generation the message was queued for.
    pub generation: u64,
}

/// Reads the session's current connection generation.
pub(crate) type CurrentGeneration = Arc<dyn Fn() -> u64 + Send + Sync>;

pub(crate) struct OutboundWorker {
    pub queue: Arc<BoundedQueue<OutboundMessage>>,
    pub transport: Arc<dyn Transport>,
    pub current_generation: CurrentGeneration,
    pub poll_interval: Duration,
    pub send_timeout: Duration,
}

impl OutboundWorker {
    pub async fn run(self, stop: CancellationToken) {
        tracing::debug!("outbound worker started");
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
                self.deliver(message).await;
            }
        }
        tracing::debug!("outbound worker stopped");
    }

    /// Transmit once.  Failures are logged and the message dropped.
    async fn deliver(&self, message: OutboundMessage) {
        let kind = message.kind.as_str();
        let current = (self.current_generation)();
        if message.generation != current {
            tracing::debug!(
                kind,
                generation = message.generation,
                current,
                "dropping outbound message from superseded connection"
            );
            return;
        }
        if !self.transport.is_connected() {
            tracing::warn!(
                kind,
                bytes = message.payload.len(),
                "transport not connected, dropping outbound message"
            );
            return;
        }
        match self
            .transport
            .send(message.kind, &message.payload, self.send_timeout)
            .await
        {
            Ok(sent) => tracing::trace!(kind, bytes = sent, "outbound message sent"),
            Err(e) => tracing::error!(
                kind,
                bytes = message.payload.len(),
                error = %e,
                "send failed, dropping outbound message"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{wait_until, MockTransport};
    use std::sync::atomic::{AtomicU64, Ordering};

    fn worker(
        queue: &Arc<BoundedQueue<OutboundMessage>>,
        transport: &Arc<MockTransport>,
    ) -> OutboundWorker {
        worker_at(queue, transport, Arc::new(AtomicU64::new(1)))
    }

    fn worker_at(
        queue: &Arc<BoundedQueue<OutboundMessage>>,
        transport: &Arc<MockTransport>,
        generation: Arc<AtomicU64>,
    ) -> OutboundWorker {
        OutboundWorker {
            queue: queue.clone(),
            transport: transport.clone(),
            current_generation: Arc::new(move || generation.load(Ordering::SeqCst)),
            poll_interval: Duration::from_millis(100),
            send_timeout: Duration::from_secs(5),
        }
    }

    fn text_for(generation: u64, s: &str) -> OutboundMessage {
        OutboundMessage {
            kind: MessageKind::Text,
            payload: s.as_bytes().to_vec(),
            generation,
        }
    }

    fn text(s: &str) -> OutboundMessage {
        text_for(1, s)
    }

    #[tokio::test]
    async fn sends_in_queue_order() {
        let queue = Arc::new(BoundedQueue::new(35));
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(true);
        let stop = CancellationToken::new();
        let task = tokio::spawn(worker(&queue, &transport).run(stop.clone()));

        queue.push(text("one"), None).await.unwrap();
        queue.push(text("two"), None).await.unwrap();
        queue
            .push(
                OutboundMessage {
                    kind: MessageKind::Binary,
                    payload: vec![0xAA, 0xBB],
                    generation: 1,
                },
                None,
            )
            .await
            .unwrap();

        assert!(wait_until(|| transport.sent().len() == 3).await);
        let sent = transport.sent();
        assert_eq!(sent[0], (MessageKind::Text, b"one".to_vec()));
        assert_eq!(sent[1], (MessageKind::Text, b"two".to_vec()));
        assert_eq!(sent[2], (MessageKind::Binary, vec![0xAA, 0xBB]));

        stop.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn drops_when_disconnected() {
        let queue = Arc::new(BoundedQueue::new(35));
        let transport = Arc::new(MockTransport::new());
        let stop = CancellationToken::new();
        let task = tokio::spawn(worker(&queue, &transport).run(stop.clone()));

        queue.push(text("lost"), None).await.unwrap();
        assert!(wait_until(|| queue.len() == 0).await);
        assert!(transport.sent().is_empty());

        // A later message still goes out once connected.
        transport.set_connected(true);
        queue.push(text("kept"), None).await.unwrap();
        assert!(wait_until(|| transport.sent().len() == 1).await);

        stop.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn send_failure_does_not_stop_worker() {
        let queue = Arc::new(BoundedQueue::new(35));
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(true);
        transport.fail_sends(1);
        let stop = CancellationToken::new();
        let task = tokio::spawn(worker(&queue, &transport).run(stop.clone()));

        queue.push(text("fails"), None).await.unwrap();
        queue.push(text("works"), None).await.unwrap();
        assert!(wait_until(|| transport.sent().len() == 1).await);
        assert_eq!(transport.sent()[0].1, b"works".to_vec());

        stop.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn drops_messages_queued_for_an_earlier_connection() {
        let queue = Arc::new(BoundedQueue::new(35));
        let transport = Arc::new(MockTransport::new());
        transport.set_connected(true);
        let generation = Arc::new(AtomicU64::new(3));
        let stop = CancellationToken::new();
        let task = tokio::spawn(worker_at(&queue, &transport, generation).run(stop.clone()));

        queue.push(text_for(2, "stale"), None).await.unwrap();
        queue.push(text_for(3, "current"), None).await.unwrap();
        assert!(wait_until(|| queue.len() == 0 && transport.sent().len() == 1).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.sent(), vec![(MessageKind::Text, b"current".to_vec())]);

        stop.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn observes_stop_while_idle() {
        let queue = Arc::new(BoundedQueue::new(35));
        let transport = Arc::new(MockTransport::new());
        let stop = CancellationToken::new();
        let task = tokio::spawn(worker(&queue, &transport).run(stop.clone()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        stop.cancel();
        tokio::time::timeout(Duration::from_millis(100), task)
            .await
            .expect("worker should exit within one poll interval")
            .unwrap();
    }
}
