//! Request/reply correlation over MQTT pub/sub. MQTT has no native
//! DEALER/ROUTER reply-to framing, so `Request()` is emulated: a waiter is
//! registered under the outgoing `message_id`, the response topic is
//! subscribed to once up front, and any incoming envelope whose
//! `correlation_id` matches resolves the waiter, using a correlation-id
//! keyed pending-reply map of one-shot channels.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alicia_core::{AliciaError, Envelope};
use tokio::sync::{oneshot, Mutex};
use uuid::Uuid;

#[derive(Default)]
pub struct PendingReplies {
    inner: Mutex<HashMap<Uuid, oneshot::Sender<Envelope>>>,
}

impl PendingReplies {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn register(&self, message_id: Uuid) -> oneshot::Receiver<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.inner.lock().await.insert(message_id, tx);
        rx
    }

    /// Resolve the waiter for `envelope.correlation_id`, if any is pending.
    /// Returns `true` if a waiter was found and notified.
    pub async fn resolve(&self, envelope: Envelope) -> bool {
        let mut guard = self.inner.lock().await;
        if let Some(tx) = guard.remove(&envelope.correlation_id) {
            let _ = tx.send(envelope);
            true
        } else {
            false
        }
    }

    pub async fn cancel(&self, message_id: &Uuid) {
        self.inner.lock().await.remove(message_id);
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }
}

/// Await a response for `message_id` up to `timeout`, cleaning the pending
/// map entry up on timeout so a late response is silently dropped.
pub async fn await_response(
    pending: &PendingReplies,
    message_id: Uuid,
    rx: oneshot::Receiver<Envelope>,
    timeout: Duration,
) -> Result<Envelope, AliciaError> {
    match tokio::time::timeout(timeout, rx).await {
        Ok(Ok(envelope)) => Ok(envelope),
        Ok(Err(_)) => Err(AliciaError::Internal("reply channel dropped".into())),
        Err(_) => {
            pending.cancel(&message_id).await;
            Err(AliciaError::Timeout {
                step: "generic",
                detail: format!("no response within {timeout:?}"),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alicia_core::{Destination, MessageType, Payload};

    fn sample_request() -> Envelope {
        Envelope::new(
            "router",
            Destination::capability("speech_to_text"),
            MessageType::Request,
            Payload::json(serde_json::json!({})),
        )
    }

    #[tokio::test]
    async fn resolve_wakes_the_matching_waiter() {
        let pending = PendingReplies::new();
        let request = sample_request();
        let rx = pending.register(request.message_id).await;

        let response = Envelope::response_to(&request, "stt", Payload::json(serde_json::json!({})));
        assert!(pending.resolve(response.clone()).await);

        let received = rx.await.unwrap();
        assert_eq!(received.message_id, response.message_id);
    }

    #[tokio::test]
    async fn resolve_with_unknown_correlation_id_is_a_noop() {
        let pending = PendingReplies::new();
        let request = sample_request();
        let response = Envelope::response_to(&request, "stt", Payload::json(serde_json::json!({})));
        assert!(!pending.resolve(response).await);
    }

    #[tokio::test]
    async fn await_response_times_out_and_clears_pending_entry() {
        let pending = PendingReplies::new();
        let request = sample_request();
        let rx = pending.register(request.message_id).await;

        let result = await_response(
            &pending,
            request.message_id,
            rx,
            Duration::from_millis(20),
        )
        .await;

        assert!(matches!(result, Err(AliciaError::Timeout { .. })));
        assert_eq!(pending.len().await, 0);
    }
}
