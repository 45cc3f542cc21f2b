//! The Registry's authoritative state: `ServiceDescriptor`s keyed by
//! `instance_id`, the capability index kept in lockstep with every
//! transition, and the `absent -> online -> offline` lifecycle with TTL
//! eviction. Held behind a single `RwLock`, with the whole map snapshotted
//! to disk at once rather than one file per entity.

use std::collections::HashMap;

use alicia_core::{CapabilityIndex, DeviceDescriptor, ServiceDescriptor, ServiceStatus};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// TTL = 3x heartbeat interval + 5s grace, applied per instance.
pub fn ttl_for(heartbeat_interval_s: u64) -> chrono::Duration {
    chrono::Duration::seconds(heartbeat_interval_s as i64 * 3 + 5)
}

/// Offline descriptors older than this are removed outright.
pub const OFFLINE_RETENTION: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("instance {instance_id} already registered with a different auth_fingerprint")]
    FingerprintMismatch { instance_id: String },
}

pub struct RegistryInner {
    services: HashMap<String, ServiceDescriptor>,
    devices: HashMap<String, DeviceDescriptor>,
    capabilities: CapabilityIndex,
}

pub struct Registry {
    inner: RwLock<RegistryInner>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                services: HashMap::new(),
                devices: HashMap::new(),
                capabilities: CapabilityIndex::new(),
            }),
        }
    }

    pub fn from_snapshot(services: Vec<ServiceDescriptor>, devices: Vec<DeviceDescriptor>) -> Self {
        let mut capabilities = CapabilityIndex::new();
        for service in &services {
            if service.status == ServiceStatus::Online {
                for cap in &service.capabilities {
                    capabilities.add(cap, &service.instance_id);
                }
            }
        }
        Self {
            inner: RwLock::new(RegistryInner {
                services: services
                    .into_iter()
                    .map(|s| (s.instance_id.clone(), s))
                    .collect(),
                devices: devices.into_iter().map(|d| (d.device_id.clone(), d)).collect(),
                capabilities,
            }),
        }
    }

    /// `absent -[register]-> online`. Idempotent for a matching
    /// `auth_fingerprint`; rejects a differing fingerprint under the same
    /// `instance_id` (a different process trying to impersonate it).
    pub async fn register(&self, mut descriptor: ServiceDescriptor) -> Result<(), RegistryError> {
        let mut guard = self.inner.write().await;
        if let Some(existing) = guard.services.get(&descriptor.instance_id) {
            if existing.auth_fingerprint != descriptor.auth_fingerprint {
                return Err(RegistryError::FingerprintMismatch {
                    instance_id: descriptor.instance_id.clone(),
                });
            }
        }

        descriptor.status = ServiceStatus::Online;
        descriptor.last_seen = Utc::now();
        let instance_id = descriptor.instance_id.clone();
        let capabilities = descriptor.capabilities.clone();

        guard.services.insert(instance_id.clone(), descriptor);
        for cap in &capabilities {
            guard.capabilities.add(cap, &instance_id);
        }
        info!(%instance_id, "service registered");
        Ok(())
    }

    /// `online -[heartbeat]-> online` and `offline -[heartbeat]-> online`.
    /// No-op (logged) if the instance was never registered.
    pub async fn heartbeat(&self, instance_id: &str) {
        let mut guard = self.inner.write().await;
        let Some(descriptor) = guard.services.get_mut(instance_id) else {
            warn!(%instance_id, "heartbeat for unknown instance");
            return;
        };
        let was_offline = descriptor.status == ServiceStatus::Offline;
        descriptor.status = ServiceStatus::Online;
        descriptor.last_seen = Utc::now();
        if was_offline {
            let capabilities = descriptor.capabilities.clone();
            for cap in &capabilities {
                guard.capabilities.add(cap, instance_id);
            }
        }
    }

    /// `online -[unregister]-> absent` (removed entirely, not retained).
    pub async fn unregister(&self, instance_id: &str) {
        let mut guard = self.inner.write().await;
        if let Some(descriptor) = guard.services.remove(instance_id) {
            guard.capabilities.remove_all(&descriptor.capabilities, instance_id);
            info!(%instance_id, "service unregistered");
        }
    }

    /// Sweep for TTL expiry (`online -> offline`) and offline retention
    /// expiry (`offline -> removed`). Call on a periodic tick.
    pub async fn sweep(&self, heartbeat_interval_s: u64) {
        let ttl = ttl_for(heartbeat_interval_s);
        let now = Utc::now();
        let mut guard = self.inner.write().await;

        let mut to_offline = Vec::new();
        let mut to_remove = Vec::new();
        for (instance_id, descriptor) in guard.services.iter() {
            match descriptor.status {
                ServiceStatus::Online if now - descriptor.last_seen > ttl => {
                    to_offline.push(instance_id.clone());
                }
                ServiceStatus::Offline if now - descriptor.last_seen > ttl + OFFLINE_RETENTION => {
                    to_remove.push(instance_id.clone());
                }
                _ => {}
            }
        }

        for instance_id in to_offline {
            if let Some(descriptor) = guard.services.get_mut(&instance_id) {
                descriptor.status = ServiceStatus::Offline;
                let capabilities = descriptor.capabilities.clone();
                guard.capabilities.remove_all(&capabilities, &instance_id);
                warn!(%instance_id, "service marked offline after TTL expiry");
            }
        }
        for instance_id in to_remove {
            guard.services.remove(&instance_id);
            info!(%instance_id, "offline service retention expired, removed");
        }
    }

    pub async fn upsert_device(&self, device: DeviceDescriptor) {
        self.inner.write().await.devices.insert(device.device_id.clone(), device);
    }

    pub async fn services(&self) -> Vec<ServiceDescriptor> {
        self.inner.read().await.services.values().cloned().collect()
    }

    pub async fn devices(&self) -> Vec<DeviceDescriptor> {
        self.inner.read().await.devices.values().cloned().collect()
    }

    /// Ordered candidates for a capability: online only, healthiest
    /// (lowest last-seen age) first, instance_id lexicographic tiebreak.
    pub async fn by_capability(&self, capability: &str) -> Vec<ServiceDescriptor> {
        let guard = self.inner.read().await;
        let candidate_ids = guard.capabilities.lookup(capability);
        let mut candidates: Vec<ServiceDescriptor> = candidate_ids
            .into_iter()
            .filter_map(|id| guard.services.get(&id).cloned())
            .filter(|d| d.status == ServiceStatus::Online)
            .collect();
        candidates.sort_by(|a, b| {
            a.last_seen
                .cmp(&b.last_seen)
                .reverse()
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        candidates
    }

    pub async fn instances_of(&self, service_name: &str) -> Vec<ServiceDescriptor> {
        let guard = self.inner.read().await;
        let mut instances: Vec<ServiceDescriptor> = guard
            .services
            .values()
            .filter(|d| d.service_name == service_name)
            .cloned()
            .collect();
        instances.sort_by(|a, b| {
            status_rank(&a.status)
                .cmp(&status_rank(&b.status))
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        instances
    }

    pub(crate) async fn snapshot(&self) -> (Vec<ServiceDescriptor>, Vec<DeviceDescriptor>) {
        let guard = self.inner.read().await;
        (
            guard.services.values().cloned().collect(),
            guard.devices.values().cloned().collect(),
        )
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

fn status_rank(status: &ServiceStatus) -> u8 {
    match status {
        ServiceStatus::Online => 0,
        ServiceStatus::Offline => 1,
        ServiceStatus::Absent => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alicia_core::descriptor::Endpoints;
    use proptest::prelude::*;

    fn descriptor(instance_id: &str, fingerprint: &str) -> ServiceDescriptor {
        ServiceDescriptor {
            service_name: "speech-to-text".into(),
            instance_id: instance_id.into(),
            version: "1.0.0".into(),
            capabilities: vec!["speech_to_text".into()],
            endpoints: Endpoints {
                inbound: "alicia/voice/stt/request".into(),
                outbound: "alicia/voice/stt/response".into(),
                status: "alicia/devices/stt/status".into(),
            },
            auth_fingerprint: fingerprint.into(),
            max_inflight: 10,
            weight: 1,
            status: ServiceStatus::Absent,
            last_seen: Utc::now(),
            registered_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn register_then_lookup_by_capability() {
        let registry = Registry::new();
        registry.register(descriptor("stt-1", "fp-1")).await.unwrap();
        let candidates = registry.by_capability("speech_to_text").await;
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].instance_id, "stt-1");
    }

    #[tokio::test]
    async fn mismatched_fingerprint_is_rejected() {
        let registry = Registry::new();
        registry.register(descriptor("stt-1", "fp-1")).await.unwrap();
        let err = registry.register(descriptor("stt-1", "fp-2")).await.unwrap_err();
        assert!(matches!(err, RegistryError::FingerprintMismatch { .. }));
    }

    #[tokio::test]
    async fn same_fingerprint_reregistration_is_idempotent() {
        let registry = Registry::new();
        registry.register(descriptor("stt-1", "fp-1")).await.unwrap();
        assert!(registry.register(descriptor("stt-1", "fp-1")).await.is_ok());
    }

    #[tokio::test]
    async fn unregister_drops_the_capability_entry() {
        let registry = Registry::new();
        registry.register(descriptor("stt-1", "fp-1")).await.unwrap();
        registry.unregister("stt-1").await;
        assert!(registry.by_capability("speech_to_text").await.is_empty());
    }

    #[tokio::test]
    async fn ttl_expiry_marks_offline_and_removes_from_capability_index() {
        let registry = Registry::new();
        let mut d = descriptor("stt-1", "fp-1");
        d.last_seen = Utc::now() - chrono::Duration::seconds(1000);
        registry.register(d).await.unwrap();
        {
            let mut guard = registry.inner.write().await;
            guard.services.get_mut("stt-1").unwrap().last_seen = Utc::now() - chrono::Duration::seconds(1000);
        }
        registry.sweep(15).await;
        assert!(registry.by_capability("speech_to_text").await.is_empty());
        let instances = registry.instances_of("speech-to-text").await;
        assert_eq!(instances[0].status, ServiceStatus::Offline);
    }

    #[tokio::test]
    async fn by_capability_orders_by_freshness_then_instance_id() {
        let registry = Registry::new();
        let mut older = descriptor("stt-b", "fp-1");
        older.last_seen = Utc::now() - chrono::Duration::seconds(30);
        let newer = descriptor("stt-a", "fp-1");
        registry.register(older).await.unwrap();
        registry.register(newer).await.unwrap();

        let candidates = registry.by_capability("speech_to_text").await;
        assert_eq!(candidates[0].instance_id, "stt-a");
    }

    proptest! {
        /// A service marked `offline` by eviction never appears in a
        /// capability lookup until a new `heartbeat` arrives, across a
        /// range of heartbeat intervals and staleness amounts.
        #[test]
        fn evicted_instance_is_absent_until_a_fresh_heartbeat(heartbeat_interval_s in 1u64..120, overshoot_s in 1i64..600) {
            let outcome: Result<(), TestCaseError> = tokio::runtime::Runtime::new().unwrap().block_on(async {
                let registry = Registry::new();
                registry.register(descriptor("stt-1", "fp-1")).await.unwrap();
                {
                    let mut guard = registry.inner.write().await;
                    let ttl = ttl_for(heartbeat_interval_s);
                    guard.services.get_mut("stt-1").unwrap().last_seen = Utc::now() - ttl - chrono::Duration::seconds(overshoot_s);
                }
                registry.sweep(heartbeat_interval_s).await;
                prop_assert!(registry.by_capability("speech_to_text").await.is_empty());

                registry.heartbeat("stt-1").await;
                prop_assert_eq!(registry.by_capability("speech_to_text").await.len(), 1);
                Ok(())
            });
            outcome?;
        }
    }
}
