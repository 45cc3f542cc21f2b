//! Dedicated heartbeat task. Ticks on its own interval regardless of how
//! saturated the handler dispatch loop is (interval ticker, `Notify`-based
//! shutdown, first tick skipped so startup doesn't double-announce).

use std::sync::Arc;
use std::time::Duration;

use alicia_core::{topics, Destination, Envelope, MessageType, Payload};
use rumqttc::AsyncClient;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub struct HeartbeatTask {
    service_name: String,
    instance_id: String,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl HeartbeatTask {
    pub fn new(service_name: impl Into<String>, instance_id: impl Into<String>, interval: Duration) -> Self {
        Self {
            service_name: service_name.into(),
            instance_id: instance_id.into(),
            interval,
            shutdown: Arc::new(Notify::new()),
        }
    }

    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run until `shutdown_handle().notify_one()` is called. Spawn this as
    /// its own task; it never shares a loop iteration with handler dispatch.
    pub async fn run(self, client: AsyncClient) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await; // first tick fires immediately; skip it

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let envelope = Envelope::new(
                        self.service_name.clone(),
                        Destination::Broadcast,
                        MessageType::Heartbeat,
                        Payload::json(serde_json::json!({
                            "service_name": self.service_name,
                            "instance_id": self.instance_id,
                        })),
                    );
                    match envelope.to_bytes() {
                        Ok(bytes) => {
                            if let Err(err) = client
                                .publish(topics::DISCOVERY_HEARTBEAT, envelope.qos(), false, bytes)
                                .await
                            {
                                warn!(error = %err, "failed to publish heartbeat");
                            } else {
                                debug!(service = %self.service_name, "heartbeat sent");
                            }
                        }
                        Err(err) => warn!(error = %err, "failed to encode heartbeat"),
                    }
                }
                _ = self.shutdown.notified() => {
                    debug!(service = %self.service_name, "heartbeat task shutting down");
                    break;
                }
            }
        }
    }
}
