//! Drives the alert engine on `alerts::EVALUATION_INTERVAL`, publishing
//! fired/cleared transitions onto the bus topics `AlertTransition::topic()`
//! names.

use std::sync::Arc;

use alicia_bus::ServiceWrapper;
use alicia_core::{Destination, Envelope, MessageType, Payload};
use tokio::sync::Notify;
use tracing::{error, info};

use crate::alerts::{AlertEngine, AlertRule};
use crate::store::MetricStore;

pub async fn run(wrapper: Arc<ServiceWrapper>, store: Arc<MetricStore>, rules: Vec<AlertRule>, shutdown: Arc<Notify>) {
    let mut engine = AlertEngine::new(rules);
    let mut interval = tokio::time::interval(crate::alerts::EVALUATION_INTERVAL);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                for (transition, event) in engine.evaluate(&store) {
                    let payload = Payload::json(serde_json::to_value(&event).unwrap_or(serde_json::Value::Null));
                    let envelope = Envelope::new("alicia-metrics", Destination::Broadcast, MessageType::Event, payload);
                    if let Err(err) = wrapper.publish(transition.topic().to_string(), &envelope).await {
                        error!(error = %err, "failed to publish alert transition");
                    }
                }
            }
            _ = shutdown.notified() => {
                info!("alert engine shutting down");
                return;
            }
        }
    }
}
