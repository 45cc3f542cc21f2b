//! Sensitive-topic declarations. Services declare which topics they own
//! that carry sensitive payloads (audio, utterances, credentials, personal
//! identifiers); the gateway rejects a declaration whose topic is already
//! owned by another live registration.

use std::collections::HashMap;

use alicia_core::AliciaError;

#[derive(Default)]
pub struct SensitiveTopicRegistry {
    owners: HashMap<String, String>,
}

impl SensitiveTopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `topics` as sensitive, owned by `service_name`. Fails the
    /// whole batch if any topic is already owned by a different service.
    pub fn declare(&mut self, service_name: &str, topics: &[String]) -> Result<(), AliciaError> {
        for topic in topics {
            if let Some(owner) = self.owners.get(topic) {
                if owner != service_name {
                    return Err(AliciaError::Forbidden(format!(
                        "topic {topic} already declared sensitive by {owner}"
                    )));
                }
            }
        }
        for topic in topics {
            self.owners.insert(topic.clone(), service_name.to_string());
        }
        Ok(())
    }

    pub fn release_all(&mut self, service_name: &str) {
        self.owners.retain(|_, owner| owner != service_name);
    }

    pub fn is_sensitive(&self, topic: &str) -> bool {
        self.owners.contains_key(topic)
    }
}
