//! `ServiceWrapper`: the one thing every substrate service embeds. Unifies
//! `Start`, `Publish`, `RegisterHandler`, `Request`, and `Shutdown` behind a
//! single handle, driven by an MQTT event loop.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alicia_core::{topics, Config, Destination, Envelope, MessageType, Payload, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::filter;
use crate::handler::{HandlerFn, HandlerTable};
use crate::health::{self, HealthState};
use crate::heartbeat::HeartbeatTask;
use crate::reconnect::Backoff;
use crate::reqrep::{self, PendingReplies};

pub struct ServiceWrapper {
    service_name: String,
    instance_id: String,
    client: AsyncClient,
    handlers: Arc<HandlerTable>,
    pending: Arc<PendingReplies>,
    health: Arc<HealthState>,
    inflight: Arc<AtomicUsize>,
    heartbeat_shutdown: Arc<Notify>,
    pump_shutdown: Arc<Notify>,
}

impl ServiceWrapper {
    /// Connect to the broker and bring up the heartbeat task, health
    /// endpoint, and event pump. Returns once the client has been
    /// constructed; the actual MQTT connection is driven by the spawned
    /// pump loop with the substrate's standard backoff-with-jitter policy.
    pub async fn start(config: &Config) -> Result<Self> {
        config.validate()?;

        let mut options = MqttOptions::new(
            format!("{}-{}", config.service.name, config.service.instance_id),
            config.mqtt.host.clone(),
            config.mqtt.port,
        );
        options.set_keep_alive(Duration::from_secs(30));
        if let (Some(username), Some(password)) = (&config.mqtt.username, &config.mqtt.password) {
            options.set_credentials(username.clone(), password.clone());
        }

        let (client, eventloop) = AsyncClient::new(options, 64);

        let handlers = Arc::new(HandlerTable::new());
        let pending = PendingReplies::new();
        let health = HealthState::new(config.service.name.clone(), Vec::new(), Vec::new());
        let inflight = Arc::new(AtomicUsize::new(0));

        let heartbeat = HeartbeatTask::new(
            config.service.name.clone(),
            config.service.instance_id.clone(),
            Duration::from_secs(config.heartbeat.interval_s),
        );
        let heartbeat_shutdown = heartbeat.shutdown_handle();
        tokio::spawn(heartbeat.run(client.clone()));

        let health_app = health::router(health.clone());
        let bind = config.health.bind.clone();
        tokio::spawn(async move {
            match tokio::net::TcpListener::bind(&bind).await {
                Ok(listener) => {
                    if let Err(err) = axum::serve(listener, health_app).await {
                        error!(error = %err, "health server exited");
                    }
                }
                Err(err) => error!(error = %err, bind = %bind, "failed to bind health endpoint"),
            }
        });

        let pump_shutdown = Arc::new(Notify::new());
        tokio::spawn(event_pump(
            eventloop,
            client.clone(),
            handlers.clone(),
            pending.clone(),
            health.clone(),
            inflight.clone(),
            pump_shutdown.clone(),
        ));

        info!(service = %config.service.name, "service wrapper started");

        Ok(Self {
            service_name: config.service.name.clone(),
            instance_id: config.service.instance_id.clone(),
            client,
            handlers,
            pending,
            health,
            inflight,
            heartbeat_shutdown,
            pump_shutdown,
        })
    }

    pub async fn publish(&self, topic: impl Into<String>, envelope: &Envelope) -> Result<()> {
        let bytes = envelope.to_bytes()?;
        self.client
            .publish(topic.into(), envelope.qos(), false, bytes)
            .await?;
        Ok(())
    }

    pub async fn subscribe(&self, topic_filter: impl Into<String>, qos: QoS) -> Result<()> {
        self.client.subscribe(topic_filter, qos).await?;
        Ok(())
    }

    pub async fn register_handler(
        &self,
        topic_filter: impl Into<String>,
        qos: QoS,
        handler: HandlerFn,
    ) -> Result<()> {
        let topic_filter = topic_filter.into();
        self.handlers.register(topic_filter.clone(), handler).await?;
        self.subscribe(topic_filter, qos).await
    }

    /// Publish `payload` to `destination_topic` and await a correlated
    /// response on the already-subscribed reply topic, up to `timeout`.
    pub async fn request(
        &self,
        destination_topic: impl Into<String>,
        destination: Destination,
        payload: Payload,
        timeout: Duration,
    ) -> Result<Envelope> {
        let envelope = Envelope::new(
            self.service_name.clone(),
            destination,
            MessageType::Request,
            payload,
        );
        let message_id = envelope.message_id;
        let rx = self.pending.register(message_id).await;

        self.publish(destination_topic, &envelope).await?;
        self.inflight.fetch_add(1, Ordering::Relaxed);
        self.health.set_inflight(self.inflight.load(Ordering::Relaxed));

        let result = reqrep::await_response(&self.pending, message_id, rx, timeout).await;

        self.inflight.fetch_sub(1, Ordering::Relaxed);
        self.health.set_inflight(self.inflight.load(Ordering::Relaxed));
        result
    }

    /// Stop the heartbeat and event pump, giving in-flight handlers up to
    /// `grace` to finish, publish the final `service.offline` event, then
    /// disconnect from the broker.
    pub async fn shutdown(&self, grace: Duration) {
        info!(service = %self.service_name, "shutting down service wrapper");
        self.heartbeat_shutdown.notify_one();
        self.pump_shutdown.notify_one();
        tokio::time::sleep(grace).await;

        let offline = Envelope::new(
            self.service_name.clone(),
            Destination::Broadcast,
            MessageType::Event,
            Payload::json(serde_json::json!({
                "service_name": self.service_name,
                "instance_id": self.instance_id,
            })),
        );
        if let Err(err) = self.publish(topics::DISCOVERY_OFFLINE, &offline).await {
            warn!(error = %err, "failed to publish service.offline event");
        }

        if let Err(err) = self.client.disconnect().await {
            warn!(error = %err, "failed to disconnect from broker cleanly");
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }
}

/// Drives the MQTT event loop: feeds incoming publishes to matching
/// handlers and resolves any pending `Request()` waiter whose reply topic
/// just delivered.
async fn event_pump(
    mut eventloop: rumqttc::EventLoop,
    client: AsyncClient,
    handlers: Arc<HandlerTable>,
    pending: Arc<PendingReplies>,
    health: Arc<HealthState>,
    inflight: Arc<AtomicUsize>,
    shutdown: Arc<Notify>,
) {
    let mut backoff = Backoff::new();
    let mut malformed_last_logged: std::collections::HashMap<String, std::time::Instant> =
        std::collections::HashMap::new();
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("event pump shutting down");
                break;
            }
            polled = eventloop.poll() => {
                match polled {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        backoff.reset();
                        health.record_broker_event();
                        let topic = publish.topic.clone();
                        match Envelope::from_bytes(&publish.payload) {
                            Ok(envelope) => {
                                if envelope.is_expired() {
                                    warn!(%topic, "dropping expired envelope");
                                    continue;
                                }
                                if envelope.routing.is_loop() {
                                    warn!(%topic, source = %envelope.source, hops = envelope.routing.hops, "dropping looped envelope");
                                    let loop_event = Envelope::new(
                                        envelope.source.clone(),
                                        Destination::Broadcast,
                                        MessageType::Error,
                                        Payload::json(serde_json::json!({
                                            "reason": "routing_loop",
                                            "message_id": envelope.message_id,
                                            "hops": envelope.routing.hops,
                                            "route": envelope.routing.route,
                                        })),
                                    );
                                    if let Ok(bytes) = loop_event.to_bytes() {
                                        if let Err(err) = client
                                            .publish(topics::ROUTING_LOOP, loop_event.qos(), false, bytes)
                                            .await
                                        {
                                            warn!(error = %err, "failed to publish routing loop event");
                                        }
                                    }
                                    continue;
                                }
                                if envelope.message_type == MessageType::Response
                                    && pending.resolve(envelope.clone()).await
                                {
                                    continue;
                                }
                                let matching = handlers.matching(&topic).await;
                                for handler in matching {
                                    inflight.fetch_add(1, Ordering::Relaxed);
                                    health.set_inflight(inflight.load(Ordering::Relaxed));
                                    let envelope = envelope.clone();
                                    let inflight = inflight.clone();
                                    let health = health.clone();
                                    tokio::spawn(async move {
                                        handler(envelope).await;
                                        inflight.fetch_sub(1, Ordering::Relaxed);
                                        health.set_inflight(inflight.load(Ordering::Relaxed));
                                    });
                                }
                            }
                            Err(err) => {
                                health.record_malformed_envelope();
                                let now = std::time::Instant::now();
                                let should_log = match malformed_last_logged.get(&topic) {
                                    Some(last) => now.duration_since(*last) >= Duration::from_secs(1),
                                    None => true,
                                };
                                if should_log {
                                    malformed_last_logged.insert(topic.clone(), now);
                                    warn!(%topic, error = %err, "failed to decode envelope");
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        backoff.reset();
                        health.record_broker_event();
                        info!("connected to broker");
                    }
                    Ok(_) => {}
                    Err(err) => {
                        let delay = backoff.next_delay();
                        error!(error = %err, delay_ms = delay.as_millis(), "broker connection error, backing off");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}
