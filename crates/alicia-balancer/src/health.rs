//! HTTP health probing: every 30s, GET each instance's health endpoint.
//! Three consecutive failed probes force the breaker open independently of
//! the request-error counter, which trips on five consecutive request
//! errors instead (see `breaker::CircuitBreaker`).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::warn;

use crate::pool::InstancePool;

pub const PROBE_INTERVAL: Duration = Duration::from_secs(30);
pub const PROBE_FAILURE_THRESHOLD: u32 = 3;

#[derive(Default)]
struct ProbeCounters {
    consecutive_failures: HashMap<String, u32>,
}

pub struct HealthProber {
    client: reqwest::Client,
    pool: Arc<Mutex<InstancePool>>,
    counters: Mutex<ProbeCounters>,
}

impl HealthProber {
    pub fn new(pool: Arc<Mutex<InstancePool>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            pool,
            counters: Mutex::new(ProbeCounters::default()),
        }
    }

    /// Probe every instance's `/health` endpoint once, updating breakers.
    /// Call on a `PROBE_INTERVAL` ticker.
    pub async fn probe_once(&self) {
        let addresses: Vec<(String, String)> = {
            let pool = self.pool.lock().await;
            pool.instances
                .values()
                .map(|i| (i.instance_id.clone(), i.address.clone()))
                .collect()
        };

        for (instance_id, address) in addresses {
            let healthy = self.probe_address(&address).await;
            let mut counters = self.counters.lock().await;
            let count = counters.consecutive_failures.entry(instance_id.clone()).or_insert(0);

            if healthy {
                *count = 0;
            } else {
                *count += 1;
                if *count >= PROBE_FAILURE_THRESHOLD {
                    let mut pool = self.pool.lock().await;
                    if let Some(record) = pool.instances.get_mut(&instance_id) {
                        record.breaker.force_open();
                        warn!(%instance_id, "health probe failures tripped breaker open");
                    }
                }
            }
        }
    }

    async fn probe_address(&self, address: &str) -> bool {
        let url = format!("http://{address}/health");
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
