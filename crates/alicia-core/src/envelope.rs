//! The bus envelope: the single message shape every substrate service
//! publishes and consumes, carrying the routing/security/priority fields
//! the substrate requires alongside the payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Routing destination for an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Destination {
    Service(String),
    Capability(String),
    Device(String),
    Broadcast,
}

impl Destination {
    pub fn service(name: impl Into<String>) -> Self {
        Destination::Service(name.into())
    }

    pub fn capability(name: impl Into<String>) -> Self {
        Destination::Capability(name.into())
    }
}

/// Envelope message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Request,
    Response,
    Event,
    Command,
    Heartbeat,
    Error,
}

/// Routing hint only; never affects delivery ordering guarantees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// Opaque structured payload with a content-type tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payload {
    pub content_type: String,
    pub body: serde_json::Value,
}

impl Payload {
    pub fn json(body: serde_json::Value) -> Self {
        Self {
            content_type: "application/json".to_string(),
            body,
        }
    }

    pub fn encode<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::json(serde_json::to_value(value)?))
    }

    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

/// `{encryption, key_id, nonce, signature?}` — present only when the
/// payload was encrypted by the security gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityBlock {
    pub encryption: String,
    pub key_id: String,
    /// Base64-encoded 96-bit nonce.
    pub nonce: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SecurityBlock {
    pub fn aes_256_gcm(key_id: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            encryption: "aes-256-gcm".to_string(),
            key_id: key_id.into(),
            nonce: nonce.into(),
            signature: None,
        }
    }
}

/// `{hops, max_hops, route[]}` — receiver rejects when `hops >= max_hops`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routing {
    pub hops: u32,
    pub max_hops: u32,
    #[serde(default)]
    pub route: Vec<String>,
}

impl Default for Routing {
    fn default() -> Self {
        Self {
            hops: 0,
            max_hops: 16,
            route: Vec::new(),
        }
    }
}

impl Routing {
    pub fn is_loop(&self) -> bool {
        self.hops >= self.max_hops
    }

    /// Produce the routing block for the next hop, stamping `via` onto the route.
    pub fn advance(&self, via: impl Into<String>) -> Self {
        let mut route = self.route.clone();
        route.push(via.into());
        Self {
            hops: self.hops + 1,
            max_hops: self.max_hops,
            route,
        }
    }
}

/// The envelope carried on every bus message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub message_id: Uuid,
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub destination: Destination,
    pub message_type: MessageType,
    #[serde(default)]
    pub priority: Priority,
    pub ttl_seconds: u32,
    pub payload: Payload,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub security: Option<SecurityBlock>,
    #[serde(default)]
    pub routing: Routing,
}

impl Envelope {
    /// Build a brand-new request/event/command envelope. `message_id` is
    /// freshly generated; `correlation_id` defaults to the same value
    /// (a request is its own correlation anchor until a response copies it).
    pub fn new(
        source: impl Into<String>,
        destination: Destination,
        message_type: MessageType,
        payload: Payload,
    ) -> Self {
        let message_id = Uuid::new_v4();
        Self {
            message_id,
            correlation_id: message_id,
            timestamp: Utc::now(),
            source: source.into(),
            destination,
            message_type,
            priority: Priority::default(),
            ttl_seconds: 30,
            payload,
            security: None,
            routing: Routing::default(),
        }
    }

    /// Build the response envelope for a given request, copying its
    /// `message_id` into `correlation_id` per the envelope invariant.
    pub fn response_to(request: &Envelope, source: impl Into<String>, payload: Payload) -> Self {
        Self {
            message_id: Uuid::new_v4(),
            correlation_id: request.message_id,
            timestamp: Utc::now(),
            source: source.into(),
            destination: Destination::Service(request.source.clone()),
            message_type: MessageType::Response,
            priority: request.priority,
            ttl_seconds: request.ttl_seconds,
            payload,
            security: None,
            routing: Routing::default(),
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u32) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// QoS to use when publishing this envelope, per the wrapper's
    /// message-type policy (request/response/command get QoS 1).
    pub fn qos(&self) -> rumqttc::QoS {
        match self.message_type {
            MessageType::Request | MessageType::Response | MessageType::Command => {
                rumqttc::QoS::AtLeastOnce
            }
            MessageType::Heartbeat | MessageType::Event | MessageType::Error => {
                rumqttc::QoS::AtMostOnce
            }
        }
    }

    pub fn is_expired(&self) -> bool {
        let deadline = self.timestamp + chrono::Duration::seconds(self.ttl_seconds as i64);
        Utc::now() > deadline
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_bytes() {
        let env = Envelope::new(
            "stt",
            Destination::capability("dialog"),
            MessageType::Request,
            Payload::json(serde_json::json!({"transcript": "turn on the lamp"})),
        );
        let bytes = env.to_bytes().unwrap();
        let decoded = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.message_id, env.message_id);
        assert_eq!(decoded.correlation_id, env.correlation_id);
    }

    #[test]
    fn response_correlation_id_matches_request_message_id() {
        let request = Envelope::new(
            "router",
            Destination::capability("speech_to_text"),
            MessageType::Request,
            Payload::json(serde_json::json!({})),
        );
        let response = Envelope::response_to(
            &request,
            "stt",
            Payload::json(serde_json::json!({"transcript": "hi", "confidence": 0.9})),
        );
        assert_eq!(response.correlation_id, request.message_id);
    }

    #[test]
    fn routing_advance_increments_hops_and_detects_loop() {
        let routing = Routing::default();
        let next = routing.advance("registry");
        assert_eq!(next.hops, 1);
        assert_eq!(next.route, vec!["registry".to_string()]);

        let mut looping = Routing {
            hops: 15,
            max_hops: 16,
            route: vec![],
        };
        assert!(!looping.is_loop());
        looping.hops = 16;
        assert!(looping.is_loop());
    }

    #[test]
    fn ttl_expiry() {
        let mut env = Envelope::new(
            "x",
            Destination::Broadcast,
            MessageType::Event,
            Payload::json(serde_json::json!(null)),
        );
        env.ttl_seconds = 0;
        env.timestamp = Utc::now() - chrono::Duration::seconds(5);
        assert!(env.is_expired());
    }

    #[test]
    fn qos_policy_matches_message_type() {
        let req = Envelope::new(
            "a",
            Destination::Broadcast,
            MessageType::Request,
            Payload::json(serde_json::json!(null)),
        );
        assert_eq!(req.qos(), rumqttc::QoS::AtLeastOnce);

        let hb = Envelope::new(
            "a",
            Destination::Broadcast,
            MessageType::Heartbeat,
            Payload::json(serde_json::json!(null)),
        );
        assert_eq!(hb.qos(), rumqttc::QoS::AtMostOnce);
    }
}
