//! Wires the session state machine onto the bus: `alicia/voice/command/
//! route` starts a session, `alicia/voice/command/cancel` cancels one,
//! every transition is published on `alicia/voice/session/state`, and the
//! terminal result (or failure) is published on
//! `alicia/voice/command/result` keyed to the original `correlation_id`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alicia_bus::ServiceWrapper;
use alicia_core::{topics, AliciaError, Destination, Envelope, MessageType, Payload};
use rumqttc::QoS;
use serde::Deserialize;
use tokio::sync::{Mutex, Notify};
use tracing::info;
use uuid::Uuid;

use crate::budget;
use crate::session::{Session, ServiceCaller, SessionState};

#[derive(Deserialize)]
struct RouteRequest {
    session_id: Option<Uuid>,
    audio_bytes: String,
    locale: String,
    deadline_ms: Option<u64>,
}

#[derive(Deserialize)]
struct CancelRequest {
    session_id: Uuid,
}

pub struct VoiceRouter<C: ServiceCaller + 'static> {
    wrapper: Arc<ServiceWrapper>,
    caller: Arc<C>,
    cancellations: Mutex<HashMap<Uuid, Arc<Notify>>>,
}

impl<C: ServiceCaller + 'static> VoiceRouter<C> {
    pub fn new(wrapper: Arc<ServiceWrapper>, caller: Arc<C>) -> Arc<Self> {
        Arc::new(Self {
            wrapper,
            caller,
            cancellations: Mutex::new(HashMap::new()),
        })
    }

    /// Register the route/cancel handlers on the wrapper's dispatch table.
    pub async fn install(self: &Arc<Self>) -> Result<(), AliciaError> {
        let router = self.clone();
        self.wrapper
            .register_handler(
                topics::VOICE_COMMAND_ROUTE,
                QoS::AtLeastOnce,
                Arc::new(move |envelope| {
                    let router = router.clone();
                    Box::pin(async move { router.handle_route(envelope).await })
                }),
            )
            .await?;

        let router = self.clone();
        self.wrapper
            .register_handler(
                topics::VOICE_COMMAND_CANCEL,
                QoS::AtLeastOnce,
                Arc::new(move |envelope| {
                    let router = router.clone();
                    Box::pin(async move { router.handle_cancel(envelope).await })
                }),
            )
            .await
    }

    async fn handle_cancel(&self, envelope: Envelope) {
        let Ok(req) = envelope.payload.decode::<CancelRequest>() else {
            return;
        };
        if let Some(notify) = self.cancellations.lock().await.get(&req.session_id) {
            notify.notify_one();
        }
    }

    async fn handle_route(self: Arc<Self>, envelope: Envelope) {
        let Ok(req) = envelope.payload.decode::<RouteRequest>() else {
            return;
        };

        let session_id = req.session_id.unwrap_or_else(Uuid::new_v4);
        let deadline_ms = budget::resolve_deadline_ms(req.deadline_ms);
        let mut session = Session::new(session_id, deadline_ms);

        let cancel = Arc::new(Notify::new());
        self.cancellations.lock().await.insert(session_id, cancel.clone());

        let wrapper = self.wrapper.clone();
        let caller = self.caller.clone();
        let router = self.clone();
        let request_correlation_id = envelope.message_id;
        let request_source = envelope.source.clone();

        tokio::spawn(async move {
            let publish_transition = |s: &Session| {
                let wrapper = wrapper.clone();
                let event = Envelope::new(
                    "voice-router",
                    Destination::Broadcast,
                    MessageType::Event,
                    Payload::json(serde_json::json!({
                        "session_id": s.session_id.to_string(),
                        "state": s.state,
                    })),
                );
                tokio::spawn(async move {
                    let _ = wrapper.publish(topics::VOICE_SESSION_STATE, &event).await;
                });
            };

            tokio::select! {
                _ = crate::session::drive(&mut session, &req.locale, &req.audio_bytes, caller.as_ref(), publish_transition) => {}
                _ = cancel.notified() => {
                    session.state = SessionState::Cancelled;
                    info!(%session_id, "session cancelled");
                }
            }

            router.cancellations.lock().await.remove(&session_id);

            let result_payload = match &session.state {
                SessionState::Done => Payload::json(serde_json::json!({
                    "session_id": session.session_id.to_string(),
                    "status": "ok",
                    "reply_text": session.reply_text,
                    "audio_bytes": session.audio_out.as_ref().map(|b| String::from_utf8_lossy(b).to_string()),
                })),
                SessionState::Failed { reason } => Payload::json(serde_json::json!({
                    "session_id": session.session_id.to_string(),
                    "status": "failed",
                    "reason": reason,
                    "user_message": AliciaError::from(*reason).user_message(),
                })),
                _ => Payload::json(serde_json::json!({
                    "session_id": session.session_id.to_string(),
                    "status": "cancelled",
                })),
            };

            let mut result = Envelope::new(
                "voice-router",
                Destination::service(request_source),
                MessageType::Response,
                result_payload,
            );
            result.correlation_id = request_correlation_id;
            let _ = wrapper.publish(topics::VOICE_COMMAND_RESULT, &result).await;
        });
    }
}

/// Default sub-budget-aware timeout applied when a capability's own
/// `max_inflight`/health state can't be consulted synchronously.
pub const DEFAULT_CAPABILITY_TIMEOUT: Duration = Duration::from_secs(5);
