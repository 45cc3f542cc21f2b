//! `MetricSample`: `{name, value, timestamp, labels, kind}`, plus the
//! label-set hashing used to key the per-`(metric_name, label_set)` ring
//! buffer.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
    Summary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub name: String,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub kind: MetricKind,
}

/// Order-independent hash of a label set, used as the ring buffer's key
/// alongside the metric name (`BTreeMap` already normalizes ordering; the
/// hash keeps the map key short and fixed-size).
pub fn label_set_hash(labels: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in labels {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b";");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_set_hash_is_order_independent() {
        let mut a = BTreeMap::new();
        a.insert("service".to_string(), "stt".to_string());
        a.insert("instance".to_string(), "stt-1".to_string());

        let mut b = BTreeMap::new();
        b.insert("instance".to_string(), "stt-1".to_string());
        b.insert("service".to_string(), "stt".to_string());

        assert_eq!(label_set_hash(&a), label_set_hash(&b));
    }

    #[test]
    fn different_label_values_hash_differently() {
        let mut a = BTreeMap::new();
        a.insert("service".to_string(), "stt".to_string());
        let mut b = BTreeMap::new();
        b.insert("service".to_string(), "tts".to_string());
        assert_ne!(label_set_hash(&a), label_set_hash(&b));
    }
}
