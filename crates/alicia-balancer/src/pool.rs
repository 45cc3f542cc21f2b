//! Per-logical-service instance pool: one `InstanceRecord` per registered
//! instance, each guarding its own breaker and inflight counter.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::breaker::{BreakerState, CircuitBreaker};

pub struct InstanceRecord {
    pub instance_id: String,
    pub address: String,
    pub weight: u32,
    pub max_inflight: u32,
    inflight: AtomicU32,
    pub avg_rtt_ms: f64,
    pub breaker: CircuitBreaker,
    /// Smooth weighted round robin's running current-weight accumulator.
    pub current_weight: i64,
}

impl InstanceRecord {
    pub fn new(instance_id: impl Into<String>, address: impl Into<String>, weight: u32, max_inflight: u32) -> Self {
        Self {
            instance_id: instance_id.into(),
            address: address.into(),
            weight,
            max_inflight,
            inflight: AtomicU32::new(0),
            avg_rtt_ms: 0.0,
            breaker: CircuitBreaker::new(5, std::time::Duration::from_secs(60)),
            current_weight: 0,
        }
    }

    pub fn inflight(&self) -> u32 {
        self.inflight.load(Ordering::Relaxed)
    }

    pub fn is_at_capacity(&self) -> bool {
        self.inflight() >= self.max_inflight
    }

    pub fn is_available(&self) -> bool {
        self.breaker.state() != BreakerState::Open && !self.is_at_capacity()
    }

    pub fn acquire(&self) {
        self.inflight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn release(&self) {
        self.inflight
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| Some(v.saturating_sub(1)))
            .ok();
    }
}

pub struct InstancePool {
    pub instances: HashMap<String, InstanceRecord>,
    /// Round-robin cursor; index into a stable ordering of instance ids.
    pub round_robin_cursor: usize,
}

impl InstancePool {
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
            round_robin_cursor: 0,
        }
    }

    pub fn upsert(&mut self, record: InstanceRecord) {
        self.instances.insert(record.instance_id.clone(), record);
    }

    pub fn remove(&mut self, instance_id: &str) {
        self.instances.remove(instance_id);
    }

    /// Stable ordering (by instance_id) every algorithm indexes into, so
    /// selection stays reproducible across calls given the same pool state.
    pub fn ordered_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.instances.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for InstancePool {
    fn default() -> Self {
        Self::new()
    }
}
