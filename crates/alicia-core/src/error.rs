//! Error taxonomy reported as `error` envelopes on the bus, plus the
//! typed leaf error every substrate crate propagates internally.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The wire-level reason code carried in an `error` envelope's payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorReason {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
    TimeoutStt,
    TimeoutAi,
    TimeoutTts,
    TimeoutGeneric,
    ServiceUnavailable,
    Overloaded,
    UpstreamError,
    DecryptFailed,
    PolicyDenied,
    Internal,
}

impl ErrorReason {
    /// Transient categories are retriable by policy at the caller.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorReason::TimeoutStt
                | ErrorReason::TimeoutAi
                | ErrorReason::TimeoutTts
                | ErrorReason::TimeoutGeneric
                | ErrorReason::ServiceUnavailable
                | ErrorReason::Overloaded
        )
    }
}

/// Typed error propagated inside a process. Translated to an `ErrorReason`
/// at the handler boundary before it ever reaches the bus — raw variants
/// (and their `Display` text) never leave the process.
#[derive(Debug, Error)]
pub enum AliciaError {
    #[error("malformed envelope: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("timed out waiting for {step}: {detail}")]
    Timeout { step: &'static str, detail: String },

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("overloaded: {0}")]
    Overloaded(String),

    #[error("upstream error: {0}")]
    UpstreamError(String),

    #[error("decryption failed: {0}")]
    DecryptFailed(String),

    #[error("policy denied: {0}")]
    PolicyDenied(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("mqtt client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("mqtt connection error: {0}")]
    MqttConnection(#[from] rumqttc::ConnectionError),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl AliciaError {
    /// Map to the wire-level taxonomy reason reported in an `error` envelope.
    pub fn reason(&self) -> ErrorReason {
        match self {
            AliciaError::BadRequest(_) | AliciaError::Serialization(_) => ErrorReason::BadRequest,
            AliciaError::Unauthorized(_) => ErrorReason::Unauthorized,
            AliciaError::Forbidden(_) => ErrorReason::Forbidden,
            AliciaError::NotFound(_) => ErrorReason::NotFound,
            AliciaError::Timeout { step, .. } => match *step {
                "stt" => ErrorReason::TimeoutStt,
                "ai" => ErrorReason::TimeoutAi,
                "tts" => ErrorReason::TimeoutTts,
                _ => ErrorReason::TimeoutGeneric,
            },
            AliciaError::ServiceUnavailable(_)
            | AliciaError::Mqtt(_)
            | AliciaError::MqttConnection(_) => ErrorReason::ServiceUnavailable,
            AliciaError::Overloaded(_) => ErrorReason::Overloaded,
            AliciaError::UpstreamError(_) => ErrorReason::UpstreamError,
            AliciaError::DecryptFailed(_) => ErrorReason::DecryptFailed,
            AliciaError::PolicyDenied(_) => ErrorReason::PolicyDenied,
            AliciaError::Internal(_) | AliciaError::Config(_) | AliciaError::Io(_) => {
                ErrorReason::Internal
            }
        }
    }

    /// Short localized string safe to put on the wire as `user_message`.
    pub fn user_message(&self) -> &'static str {
        match self.reason() {
            ErrorReason::BadRequest => "The request could not be understood.",
            ErrorReason::Unauthorized => "Authentication failed.",
            ErrorReason::Forbidden => "Not permitted.",
            ErrorReason::NotFound => "Nothing found for that request.",
            ErrorReason::TimeoutStt => "I didn't catch that in time.",
            ErrorReason::TimeoutAi => "That took too long to think about.",
            ErrorReason::TimeoutTts => "I couldn't respond in time.",
            ErrorReason::TimeoutGeneric => "That took too long.",
            ErrorReason::ServiceUnavailable => "That service is unavailable right now.",
            ErrorReason::Overloaded => "Too busy right now, please try again.",
            ErrorReason::UpstreamError => "Something went wrong upstream.",
            ErrorReason::DecryptFailed => "Could not verify the message.",
            ErrorReason::PolicyDenied => "That action isn't allowed.",
            ErrorReason::Internal => "Something went wrong.",
        }
    }
}

pub type Result<T> = std::result::Result<T, AliciaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_step_maps_to_specific_reason() {
        let err = AliciaError::Timeout {
            step: "ai",
            detail: "dialog capability".into(),
        };
        assert_eq!(err.reason(), ErrorReason::TimeoutAi);
    }

    #[test]
    fn transient_reasons_are_marked_retriable() {
        assert!(ErrorReason::TimeoutStt.is_transient());
        assert!(ErrorReason::ServiceUnavailable.is_transient());
        assert!(!ErrorReason::Unauthorized.is_transient());
        assert!(!ErrorReason::Internal.is_transient());
    }

    #[test]
    fn user_message_never_echoes_internal_detail() {
        let err = AliciaError::Internal("panic in handler X at line 42".into());
        assert_eq!(err.user_message(), "Something went wrong.");
    }
}
