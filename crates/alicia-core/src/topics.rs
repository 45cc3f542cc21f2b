//! The `alicia/` topic namespace (spec §6). Centralized here so every
//! crate subscribes/publishes against the same literal strings.

pub const DISCOVERY_REGISTER: &str = "alicia/system/discovery/register";
pub const DISCOVERY_UNREGISTER: &str = "alicia/system/discovery/unregister";
pub const DISCOVERY_HEARTBEAT: &str = "alicia/system/discovery/heartbeat";
pub const DISCOVERY_OFFLINE: &str = "alicia/system/discovery/offline";
pub const ROUTING_LOOP: &str = "alicia/system/routing/loop";

pub const VOICE_STT_REQUEST: &str = "alicia/voice/stt/request";
pub const VOICE_STT_RESPONSE: &str = "alicia/voice/stt/response";
pub const VOICE_AI_REQUEST: &str = "alicia/voice/ai/request";
pub const VOICE_AI_RESPONSE: &str = "alicia/voice/ai/response";
pub const VOICE_TTS_REQUEST: &str = "alicia/voice/tts/request";
pub const VOICE_TTS_RESPONSE: &str = "alicia/voice/tts/response";

pub const VOICE_COMMAND_ROUTE: &str = "alicia/voice/command/route";
pub const VOICE_COMMAND_RESULT: &str = "alicia/voice/command/result";
pub const VOICE_COMMAND_CANCEL: &str = "alicia/voice/command/cancel";
pub const VOICE_SESSION_STATE: &str = "alicia/voice/session/state";

pub const METRICS_INGEST: &str = "alicia/metrics/ingest";
pub const ALERTS_ACTIVE: &str = "alicia/alerts/active";
pub const ALERTS_CLEARED: &str = "alicia/alerts/cleared";

pub const SCHEDULER_EVENTS: &str = "alicia/scheduler/events";
pub const SCHEDULER_EXECUTIONS: &str = "alicia/scheduler/executions";
pub const SCHEDULER_TRIGGERS: &str = "alicia/scheduler/triggers";

pub fn device_command(device_id: &str) -> String {
    format!("alicia/devices/{device_id}/command")
}

pub fn device_status(device_id: &str) -> String {
    format!("alicia/devices/{device_id}/status")
}
