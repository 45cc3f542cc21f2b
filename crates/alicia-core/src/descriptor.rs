//! Registry data model: service/device descriptors and the capability
//! index used to look candidates up by capability name.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoints {
    #[serde(rename = "in")]
    pub inbound: String,
    #[serde(rename = "out")]
    pub outbound: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Online,
    Offline,
    Absent,
}

/// `{service_name, instance_id, version, capabilities[], endpoints,
/// auth_fingerprint, max_inflight, weight}` plus the registry's own
/// bookkeeping fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub service_name: String,
    pub instance_id: String,
    pub version: String,
    pub capabilities: Vec<String>,
    pub endpoints: Endpoints,
    pub auth_fingerprint: String,
    pub max_inflight: u32,
    pub weight: u32,
    pub status: ServiceStatus,
    pub last_seen: DateTime<Utc>,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Online,
    Offline,
    Unknown,
}

/// `{device_id, device_type, capabilities[], endpoints, metadata, status,
/// last_seen}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub device_id: String,
    pub device_type: String,
    pub capabilities: Vec<String>,
    pub endpoints: HashMap<String, String>,
    pub metadata: HashMap<String, String>,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
}

/// Capability name -> ordered set of descriptor ids. Insertion order is
/// preserved (ties broken by instance_id lexicographically for determinism
/// at the caller, since `IndexSet` does not reorder on lookup).
#[derive(Debug, Default)]
pub struct CapabilityIndex {
    entries: HashMap<String, IndexSet<String>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, capability: &str, instance_id: &str) {
        self.entries
            .entry(capability.to_string())
            .or_default()
            .insert(instance_id.to_string());
    }

    pub fn remove(&mut self, capability: &str, instance_id: &str) {
        if let Some(set) = self.entries.get_mut(capability) {
            set.shift_remove(instance_id);
            if set.is_empty() {
                self.entries.remove(capability);
            }
        }
    }

    pub fn remove_all(&mut self, capabilities: &[String], instance_id: &str) {
        for cap in capabilities {
            self.remove(cap, instance_id);
        }
    }

    /// Candidate instance ids for a capability, in insertion order.
    pub fn lookup(&self, capability: &str) -> Vec<String> {
        self.entries
            .get(capability)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_preserves_insertion_order() {
        let mut index = CapabilityIndex::new();
        index.add("speech_to_text", "b-instance");
        index.add("speech_to_text", "a-instance");
        assert_eq!(
            index.lookup("speech_to_text"),
            vec!["b-instance".to_string(), "a-instance".to_string()]
        );
    }

    #[test]
    fn remove_drops_empty_capability_entry() {
        let mut index = CapabilityIndex::new();
        index.add("dialog", "only-instance");
        index.remove("dialog", "only-instance");
        assert!(index.lookup("dialog").is_empty());
    }

    #[test]
    fn remove_all_clears_multiple_capabilities() {
        let mut index = CapabilityIndex::new();
        index.add("dialog", "i1");
        index.add("text_to_speech", "i1");
        index.remove_all(
            &["dialog".to_string(), "text_to_speech".to_string()],
            "i1",
        );
        assert!(index.lookup("dialog").is_empty());
        assert!(index.lookup("text_to_speech").is_empty());
    }
}
