//! The voice session state machine: `INIT -> STT_PENDING -> AI_PENDING ->
//! TTS_PENDING -> DONE`, plus terminal `FAILED`/`CANCELLED`. Each session
//! is driven by a single task owning an `Arc<Mutex<Session>>`-free state
//! value (the mutex lives one layer up, in `router::VoiceRouter`, one per
//! `session_id` — the same "serialize writes to a single descriptor"
//! convention the registry follows, applied per session here) so at most
//! one state-advancing event is processed per session at a time.

use std::time::{Duration, Instant};

use alicia_core::{AliciaError, Payload};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::budget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    LowConfidence,
    TimeoutStt,
    TimeoutAi,
    TimeoutTts,
    ServiceUnavailable,
    UpstreamError,
    PolicyDenied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
    Init,
    SttPending,
    AiPending,
    TtsPending,
    Done,
    Failed { reason: FailureReason },
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Done | SessionState::Failed { .. } | SessionState::Cancelled)
    }
}

pub struct Session {
    pub session_id: Uuid,
    pub state: SessionState,
    pub started_at: Instant,
    pub deadline: Instant,
    pub transcript: Option<String>,
    pub reply_text: Option<String>,
    pub audio_out: Option<Vec<u8>>,
    pub last_error: Option<String>,
}

impl Session {
    pub fn new(session_id: Uuid, deadline_ms: u64) -> Self {
        let now = Instant::now();
        Self {
            session_id,
            state: SessionState::Init,
            started_at: now,
            deadline: now + Duration::from_millis(deadline_ms),
            transcript: None,
            reply_text: None,
            audio_out: None,
            last_error: None,
        }
    }

    pub fn remaining(&self) -> Duration {
        budget::remaining(self.deadline)
    }
}

/// Abstracts a capability request so the state machine is testable without
/// a live bus: the balancer-resolved call (capability -> instance -> MQTT
/// round trip) is injected by the caller.
#[async_trait]
pub trait ServiceCaller: Send + Sync {
    async fn call(&self, capability: &str, payload: Payload, timeout: Duration) -> Result<Payload, AliciaError>;
}

#[derive(Debug, Deserialize)]
struct SttResult {
    transcript: String,
    confidence: f64,
}

#[derive(Debug, Deserialize)]
struct AiResult {
    reply_text: String,
}

#[derive(Debug, Deserialize)]
struct TtsResult {
    audio_bytes: String,
}

pub const CONFIDENCE_THRESHOLD: f64 = 0.55;

/// Drive `session` from `Init` through to a terminal state, emitting
/// `on_transition` after every state change (used to publish
/// `alicia/voice/session/state` events without this module knowing about
/// the bus).
pub async fn drive<C, F>(
    session: &mut Session,
    locale: &str,
    audio_bytes: &str,
    caller: &C,
    mut on_transition: F,
) where
    C: ServiceCaller,
    F: FnMut(&Session),
{
    session.state = SessionState::SttPending;
    on_transition(session);

    let stt_budget = budget::stt_sub_budget(session.remaining());
    match call_with_retry(caller, "speech_to_text", Payload::json(serde_json::json!({
        "audio_bytes": audio_bytes,
        "locale": locale,
    })), stt_budget).await {
        Ok(payload) => match payload.decode::<SttResult>() {
            Ok(stt) if stt.confidence < CONFIDENCE_THRESHOLD => {
                fail(session, FailureReason::LowConfidence, &mut on_transition);
                return;
            }
            Ok(stt) => {
                session.transcript = Some(stt.transcript);
            }
            Err(_) => {
                fail(session, FailureReason::UpstreamError, &mut on_transition);
                return;
            }
        },
        Err(err) => {
            fail(session, reason_for(&err, "stt"), &mut on_transition);
            return;
        }
    }

    session.state = SessionState::AiPending;
    on_transition(session);

    let ai_budget = budget::ai_sub_budget(session.remaining());
    let transcript = session.transcript.clone().unwrap_or_default();
    match caller
        .call(
            "dialog",
            Payload::json(serde_json::json!({
                "transcript": transcript,
                "session_context": { "session_id": session.session_id.to_string() },
            })),
            ai_budget,
        )
        .await
    {
        Ok(payload) => match payload.decode::<AiResult>() {
            Ok(ai) => session.reply_text = Some(ai.reply_text),
            Err(_) => {
                fail(session, FailureReason::UpstreamError, &mut on_transition);
                return;
            }
        },
        Err(err) => {
            fail(session, reason_for(&err, "ai"), &mut on_transition);
            return;
        }
    }

    session.state = SessionState::TtsPending;
    on_transition(session);

    let tts_budget = budget::tts_sub_budget(session.remaining());
    let reply_text = session.reply_text.clone().unwrap_or_default();
    match call_with_retry(caller, "text_to_speech", Payload::json(serde_json::json!({
        "reply_text": reply_text,
        "voice": "default",
    })), tts_budget).await {
        Ok(payload) => match payload.decode::<TtsResult>() {
            Ok(tts) => {
                session.audio_out = Some(tts.audio_bytes.into_bytes());
                session.state = SessionState::Done;
                on_transition(session);
            }
            Err(_) => fail(session, FailureReason::UpstreamError, &mut on_transition),
        },
        Err(err) => fail(session, reason_for(&err, "tts"), &mut on_transition),
    }
}

async fn call_with_retry<C: ServiceCaller>(
    caller: &C,
    capability: &str,
    payload: Payload,
    sub_budget: Duration,
) -> Result<Payload, AliciaError> {
    let started = Instant::now();
    match caller.call(capability, payload.clone(), sub_budget).await {
        Err(AliciaError::ServiceUnavailable(_)) if budget::retry_eligible(sub_budget, started.elapsed()) => {
            info!(capability, "retrying after service_unavailable");
            let remaining_budget = sub_budget.saturating_sub(started.elapsed());
            caller.call(capability, payload, remaining_budget).await
        }
        other => other,
    }
}

impl From<FailureReason> for AliciaError {
    fn from(reason: FailureReason) -> Self {
        match reason {
            FailureReason::LowConfidence => AliciaError::BadRequest("low confidence transcript".into()),
            FailureReason::TimeoutStt => AliciaError::Timeout { step: "stt", detail: "speech_to_text".into() },
            FailureReason::TimeoutAi => AliciaError::Timeout { step: "ai", detail: "dialog".into() },
            FailureReason::TimeoutTts => AliciaError::Timeout { step: "tts", detail: "text_to_speech".into() },
            FailureReason::ServiceUnavailable => AliciaError::ServiceUnavailable("capability unavailable".into()),
            FailureReason::UpstreamError => AliciaError::UpstreamError("capability call failed".into()),
            FailureReason::PolicyDenied => AliciaError::PolicyDenied("voice command denied".into()),
        }
    }
}

fn reason_for(err: &AliciaError, step: &str) -> FailureReason {
    match err {
        AliciaError::Timeout { .. } => match step {
            "stt" => FailureReason::TimeoutStt,
            "ai" => FailureReason::TimeoutAi,
            _ => FailureReason::TimeoutTts,
        },
        AliciaError::ServiceUnavailable(_) => FailureReason::ServiceUnavailable,
        AliciaError::PolicyDenied(_) => FailureReason::PolicyDenied,
        _ => FailureReason::UpstreamError,
    }
}

fn fail<F: FnMut(&Session)>(session: &mut Session, reason: FailureReason, on_transition: &mut F) {
    session.last_error = Some(format!("{reason:?}"));
    session.state = SessionState::Failed { reason };
    on_transition(session);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct StubCaller {
        stt_confidence: f64,
        fail_once: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ServiceCaller for StubCaller {
        async fn call(&self, capability: &str, _payload: Payload, _timeout: Duration) -> Result<Payload, AliciaError> {
            match capability {
                "speech_to_text" => Ok(Payload::json(serde_json::json!({
                    "transcript": "turn on the lamp",
                    "confidence": self.stt_confidence,
                }))),
                "dialog" => Ok(Payload::json(serde_json::json!({ "reply_text": "done" }))),
                "text_to_speech" => {
                    if self.fail_once.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(AliciaError::ServiceUnavailable("tts busy".into()))
                    } else {
                        Ok(Payload::json(serde_json::json!({ "audio_bytes": "YXVkaW8=" })))
                    }
                }
                other => panic!("unexpected capability {other}"),
            }
        }
    }

    #[tokio::test]
    async fn happy_path_reaches_done() {
        let caller = StubCaller {
            stt_confidence: 0.9,
            fail_once: Arc::new(AtomicUsize::new(1)),
        };
        let mut session = Session::new(Uuid::new_v4(), 8_000);
        let mut transitions = Vec::new();
        drive(&mut session, "en-US", "YXVkaW8=", &caller, |s| transitions.push(s.state.clone())).await;

        assert_eq!(session.state, SessionState::Done);
        assert!(transitions.contains(&SessionState::SttPending));
        assert!(transitions.contains(&SessionState::AiPending));
        assert!(transitions.contains(&SessionState::TtsPending));
    }

    #[tokio::test]
    async fn low_confidence_transcript_fails_fast() {
        let caller = StubCaller {
            stt_confidence: 0.2,
            fail_once: Arc::new(AtomicUsize::new(1)),
        };
        let mut session = Session::new(Uuid::new_v4(), 8_000);
        drive(&mut session, "en-US", "YXVkaW8=", &caller, |_| {}).await;
        assert_eq!(
            session.state,
            SessionState::Failed { reason: FailureReason::LowConfidence }
        );
    }

    #[tokio::test]
    async fn tts_retries_once_on_service_unavailable() {
        let caller = StubCaller {
            stt_confidence: 0.9,
            fail_once: Arc::new(AtomicUsize::new(0)),
        };
        let mut session = Session::new(Uuid::new_v4(), 8_000);
        drive(&mut session, "en-US", "YXVkaW8=", &caller, |_| {}).await;
        assert_eq!(session.state, SessionState::Done);
    }
}
