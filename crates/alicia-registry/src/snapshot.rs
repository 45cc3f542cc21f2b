//! Periodic snapshot persistence: write-then-rename for atomicity. Reload
//! tolerates a missing file; a corrupt file is logged and treated as empty
//! rather than aborting startup.

use std::path::{Path, PathBuf};

use alicia_core::{DeviceDescriptor, ServiceDescriptor};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::registry::Registry;

#[derive(Serialize, Deserialize, Default)]
struct SnapshotFile {
    services: Vec<ServiceDescriptor>,
    devices: Vec<DeviceDescriptor>,
}

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn load(&self) -> Registry {
        if !self.path.exists() {
            return Registry::new();
        }
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read registry snapshot, starting empty");
                return Registry::new();
            }
        };
        match serde_json::from_str::<SnapshotFile>(&raw) {
            Ok(snapshot) => {
                info!(
                    path = %self.path.display(),
                    services = snapshot.services.len(),
                    devices = snapshot.devices.len(),
                    "loaded registry snapshot"
                );
                Registry::from_snapshot(snapshot.services, snapshot.devices)
            }
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "corrupt registry snapshot, starting empty");
                Registry::new()
            }
        }
    }

    pub async fn save(&self, registry: &Registry) -> std::io::Result<()> {
        let (services, devices) = registry.snapshot().await;
        let snapshot = SnapshotFile { services, devices };
        let body = serde_json::to_vec_pretty(&snapshot)?;

        let tmp_path = tmp_sibling(&self.path);
        std::fs::write(&tmp_path, &body)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alicia_core::descriptor::Endpoints;
    use alicia_core::ServiceStatus;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("alicia-registry-snapshot-{}.json", uuid::Uuid::new_v4()))
    }

    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor {
            service_name: "dialog".into(),
            instance_id: "dialog-1".into(),
            version: "1.0.0".into(),
            capabilities: vec!["dialog".into()],
            endpoints: Endpoints {
                inbound: "alicia/voice/ai/request".into(),
                outbound: "alicia/voice/ai/response".into(),
                status: "alicia/devices/dialog/status".into(),
            },
            auth_fingerprint: "fp".into(),
            max_inflight: 5,
            weight: 1,
            status: ServiceStatus::Online,
            last_seen: chrono::Utc::now(),
            registered_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_then_load_roundtrips_registered_services() {
        let path = temp_path();
        let store = SnapshotStore::new(&path);

        let registry = Registry::new();
        registry.register(descriptor()).await.unwrap();
        store.save(&registry).await.unwrap();

        let reloaded = store.load();
        let services = reloaded.services().await;
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].instance_id, "dialog-1");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn missing_snapshot_file_loads_an_empty_registry() {
        let store = SnapshotStore::new(temp_path());
        let registry = store.load();
        assert!(futures::executor::block_on(registry.services()).is_empty());
    }
}
