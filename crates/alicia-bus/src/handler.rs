//! Topic-filter-keyed handler registration. A service registers one async
//! handler per filter; a second registration on the same filter is rejected
//! rather than silently overwriting the first.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use alicia_core::{AliciaError, Envelope};
use tokio::sync::RwLock;

use crate::filter;

pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
pub type HandlerFn = Arc<dyn Fn(Envelope) -> HandlerFuture + Send + Sync>;

#[derive(Default)]
pub struct HandlerTable {
    entries: RwLock<HashMap<String, HandlerFn>>,
}

impl HandlerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `topic_filter`. Errors if the exact filter
    /// string is already registered.
    pub async fn register(
        &self,
        topic_filter: impl Into<String>,
        handler: HandlerFn,
    ) -> Result<(), AliciaError> {
        let topic_filter = topic_filter.into();
        let mut entries = self.entries.write().await;
        if entries.contains_key(&topic_filter) {
            return Err(AliciaError::BadRequest(format!(
                "handler already registered for filter {topic_filter}"
            )));
        }
        entries.insert(topic_filter, handler);
        Ok(())
    }

    pub async fn unregister(&self, topic_filter: &str) {
        self.entries.write().await.remove(topic_filter);
    }

    /// All filters whose pattern matches `topic`, in no particular order.
    pub async fn matching(&self, topic: &str) -> Vec<HandlerFn> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|(pattern, _)| filter::matches(topic, pattern))
            .map(|(_, handler)| handler.clone())
            .collect()
    }

    pub async fn subscribed_filters(&self) -> Vec<String> {
        self.entries.read().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alicia_core::{Destination, MessageType, Payload};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_envelope() -> Envelope {
        Envelope::new(
            "x",
            Destination::Broadcast,
            MessageType::Event,
            Payload::json(serde_json::json!(null)),
        )
    }

    #[tokio::test]
    async fn duplicate_filter_registration_is_rejected() {
        let table = HandlerTable::new();
        let handler: HandlerFn = Arc::new(|_| Box::pin(async {}));
        table.register("alicia/devices/+/status", handler.clone()).await.unwrap();
        let err = table.register("alicia/devices/+/status", handler).await.unwrap_err();
        assert!(matches!(err, AliciaError::BadRequest(_)));
    }

    #[tokio::test]
    async fn matching_dispatches_to_every_matching_filter() {
        let table = HandlerTable::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = hits.clone();
        table
            .register(
                "alicia/devices/+/status",
                Arc::new(move |_| {
                    let hits_a = hits_a.clone();
                    Box::pin(async move {
                        hits_a.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        let hits_b = hits.clone();
        table
            .register(
                "alicia/#",
                Arc::new(move |_| {
                    let hits_b = hits_b.clone();
                    Box::pin(async move {
                        hits_b.fetch_add(1, Ordering::SeqCst);
                    })
                }),
            )
            .await
            .unwrap();

        let handlers = table.matching("alicia/devices/lamp-1/status").await;
        assert_eq!(handlers.len(), 2);
        for handler in handlers {
            handler(sample_envelope()).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
