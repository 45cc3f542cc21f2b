//! Topology-driven launcher: brings up a configured subset of substrate
//! services in a single process, wiring the cross-crate adapters together.
//! Acts as the single place that knows the whole topology, but spawns
//! sibling `tokio` tasks in-process rather than sibling OS processes — this
//! launcher's services share one broker connection per the substrate's
//! resource model rather than one connection per worker process.

use std::sync::Arc;

use alicia_balancer::{Algorithm, HealthProber, InstancePool, InstanceRecord};
use alicia_bus::ServiceWrapper;
use alicia_core::Config;
use alicia_gateway::{CaTrustStore, KeyStore, TokenIssuer};
use alicia_metrics::MetricStore;
use alicia_registry::{Registry, RegistryApiState, SnapshotStore};
use alicia_scheduler::{SchedulerState, WorkerPool};
use alicia_voice::VoiceRouter;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

use crate::adapters::{BalancedServiceCaller, GatewayTokenVerifier};
use crate::exit;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Gateway,
    Registry,
    Voice,
    Balancer,
    Metrics,
    Scheduler,
    All,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(Role::Gateway),
            "registry" => Ok(Role::Registry),
            "voice" => Ok(Role::Voice),
            "balancer" => Ok(Role::Balancer),
            "metrics" => Ok(Role::Metrics),
            "scheduler" => Ok(Role::Scheduler),
            "all" => Ok(Role::All),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

impl clap::ValueEnum for Role {
    fn value_variants<'a>() -> &'a [Self] {
        &[
            Role::Gateway,
            Role::Registry,
            Role::Voice,
            Role::Balancer,
            Role::Metrics,
            Role::Scheduler,
            Role::All,
        ]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        let name = match self {
            Role::Gateway => "gateway",
            Role::Registry => "registry",
            Role::Voice => "voice",
            Role::Balancer => "balancer",
            Role::Metrics => "metrics",
            Role::Scheduler => "scheduler",
            Role::All => "all",
        };
        Some(clap::builder::PossibleValue::new(name))
    }
}

/// Run the given roles until shutdown. Only `all` wires the cross-crate
/// adapters (gateway tokens into the registry's write API, the balancer +
/// bus into the voice router's capability calls); standalone roles run
/// with a permissive or no-op counterpart, matching what a single-service
/// deployment behind a shared gateway would see.
pub async fn run(config: Config, roles: Vec<Role>, snapshot_path: std::path::PathBuf) -> i32 {
    let wrapper = match ServiceWrapper::start(&config).await {
        Ok(w) => Arc::new(w),
        Err(err) => {
            error!(error = %err, "failed to start service wrapper");
            return exit::BROKER_UNREACHABLE;
        }
    };

    let signing_key = std::env::var("ALICIA_TOKEN_SIGNING_KEY").unwrap_or_else(|_| "dev-only-insecure-signing-key".to_string());

    let run_all = roles.contains(&Role::All);
    let shutdown = Arc::new(Notify::new());

    if run_all || roles.contains(&Role::Gateway) {
        match spawn_gateway(signing_key.as_bytes()) {
            Ok(()) => info!("gateway admission API started"),
            Err(err) => {
                error!(error = %err, "gateway startup failed");
                return exit::AUTH_FAILURE;
            }
        }
    }

    let registry = if run_all || roles.contains(&Role::Registry) {
        Some(spawn_registry(wrapper.clone(), &snapshot_path, signing_key.as_bytes()).await)
    } else {
        None
    };

    if run_all || roles.contains(&Role::Voice) {
        spawn_voice(wrapper.clone());
    }

    if run_all || roles.contains(&Role::Balancer) {
        spawn_balancer();
    }

    if run_all || roles.contains(&Role::Metrics) {
        spawn_metrics(wrapper.clone(), shutdown.clone());
    }

    if run_all || roles.contains(&Role::Scheduler) {
        spawn_scheduler(wrapper.clone(), shutdown.clone());
    }

    let _ = registry;

    tokio::signal::ctrl_c().await.ok();
    info!("shutdown signal received");
    shutdown.notify_waiters();
    wrapper.shutdown(std::time::Duration::from_secs(5)).await;
    exit::CLEAN_SHUTDOWN
}

fn spawn_gateway(signing_key: &[u8]) -> Result<(), anyhow::Error> {
    let ca_der = match std::env::var("ALICIA_CA_CERT_PATH") {
        Ok(path) => std::fs::read(path)?,
        Err(_) => Vec::new(),
    };
    let ca_trust = CaTrustStore::from_der(ca_der);
    let issuer = TokenIssuer::new(signing_key);
    let keys = KeyStore::load_or_generate(&std::path::PathBuf::from("."))?;
    let state = alicia_gateway::admission::GatewayState::new(ca_trust, issuer, keys);
    let app = alicia_gateway::admission::router(state);
    tokio::spawn(async move {
        if let Ok(listener) = tokio::net::TcpListener::bind("0.0.0.0:8443").await {
            let _ = axum::serve(listener, app.into_make_service_with_connect_info::<std::net::SocketAddr>()).await;
        }
    });
    Ok(())
}

async fn spawn_registry(
    wrapper: Arc<ServiceWrapper>,
    snapshot_path: &std::path::Path,
    signing_key: &[u8],
) -> Arc<Registry> {
    let store = SnapshotStore::new(snapshot_path.to_path_buf());
    let registry = Arc::new(store.load());

    alicia_registry::discovery::install(wrapper.clone(), registry.clone())
        .await
        .expect("discovery handlers must register");

    let issuer = Arc::new(TokenIssuer::new(signing_key));
    let verifier = Arc::new(GatewayTokenVerifier::new(issuer));
    let api_state = RegistryApiState::new(registry.clone(), verifier);
    let app = alicia_registry::api::router(api_state);
    tokio::spawn(async move {
        if let Ok(listener) = tokio::net::TcpListener::bind("0.0.0.0:8081").await {
            let _ = axum::serve(listener, app).await;
        }
    });

    let sweep_registry = registry.clone();
    let sweep_store = SnapshotStore::new(snapshot_path.to_path_buf());
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            sweep_registry.sweep(15).await;
            if let Err(err) = sweep_store.save(&sweep_registry).await {
                error!(error = %err, "failed to persist registry snapshot");
            }
        }
    });

    registry
}

fn spawn_voice(wrapper: Arc<ServiceWrapper>) {
    let caller = Arc::new(BalancedServiceCaller::new(wrapper.clone(), Algorithm::LeastConnections));
    let router = VoiceRouter::new(wrapper, caller);
    tokio::spawn(async move {
        if let Err(err) = router.install().await {
            error!(error = %err, "voice router install failed");
        }
    });
}

/// Stand up a standalone instance pool for one configured target service,
/// refreshed from the registry's HTTP API and health-probed on the same
/// tick `alicia-balancer`'s own prober uses. The pool this builds isn't
/// shared with `BalancedServiceCaller` (which keeps its own, populated from
/// live call traffic) — this role exists for a deployment that wants
/// balancer health state exposed on its own regardless of which services
/// are also running in this process.
fn spawn_balancer() {
    let registry_base_url =
        std::env::var("ALICIA_REGISTRY_BASE_URL").unwrap_or_else(|_| "http://127.0.0.1:8081".to_string());
    let target_service = std::env::var("ALICIA_BALANCER_TARGET_SERVICE").unwrap_or_else(|_| "voice".to_string());

    let pool = Arc::new(Mutex::new(InstancePool::new()));
    let prober = Arc::new(HealthProber::new(pool.clone()));

    let refresh_pool = pool.clone();
    tokio::spawn(async move {
        let client = reqwest::Client::new();
        let mut interval = tokio::time::interval(alicia_balancer::health::PROBE_INTERVAL);
        loop {
            interval.tick().await;
            let url = format!("{registry_base_url}/services/{target_service}/instances");
            match client.get(&url).send().await {
                Ok(resp) => match resp.json::<Vec<alicia_core::ServiceDescriptor>>().await {
                    Ok(descriptors) => {
                        let mut pool = refresh_pool.lock().await;
                        for descriptor in descriptors {
                            pool.upsert(InstanceRecord::new(
                                descriptor.instance_id,
                                descriptor.endpoints.status,
                                descriptor.weight,
                                descriptor.max_inflight,
                            ));
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to decode registry instance list"),
                },
                Err(err) => warn!(error = %err, "failed to reach registry for instance refresh"),
            }
        }
    });

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(alicia_balancer::health::PROBE_INTERVAL);
        loop {
            interval.tick().await;
            prober.probe_once().await;
        }
    });
}

fn spawn_metrics(wrapper: Arc<ServiceWrapper>, shutdown: Arc<Notify>) {
    let store = Arc::new(MetricStore::new());
    let sampler = alicia_metrics::SystemSampler::new(store.clone(), shutdown.clone());
    tokio::spawn(sampler.run());

    let rules = load_alert_rules();
    let alert_wrapper = wrapper.clone();
    let alert_store = store.clone();
    let alert_shutdown = shutdown.clone();
    tokio::spawn(alicia_metrics::runner::run(alert_wrapper, alert_store, rules, alert_shutdown));

    let ingest_store = store.clone();
    tokio::spawn(async move {
        if let Err(err) = alicia_metrics::ingest::install(wrapper, ingest_store).await {
            error!(error = %err, "metrics ingest install failed");
        }
    });

    let api_state = alicia_metrics::ingest::IngestApiState { store };
    let app = alicia_metrics::ingest::router(api_state);
    tokio::spawn(async move {
        if let Ok(listener) = tokio::net::TcpListener::bind("0.0.0.0:8084").await {
            let _ = axum::serve(listener, app).await;
        }
    });
}

/// Alert rules are operator-authored, not learned from traffic, so they
/// load once at startup from an optional JSON file rather than through a
/// runtime CRUD surface. Absent or unreadable, the engine just runs with no
/// rules — samples still flow into the store either way.
fn load_alert_rules() -> Vec<alicia_metrics::AlertRule> {
    let Ok(path) = std::env::var("ALICIA_ALERT_RULES_PATH") else {
        return Vec::new();
    };
    match std::fs::read(&path) {
        Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(error = %err, %path, "failed to parse alert rules file");
            Vec::new()
        }),
        Err(err) => {
            warn!(error = %err, %path, "failed to read alert rules file");
            Vec::new()
        }
    }
}

fn spawn_scheduler(wrapper: Arc<ServiceWrapper>, shutdown: Arc<Notify>) {
    let state = Arc::new(SchedulerState::new());
    let pool = Arc::new(WorkerPool::new(
        state.clone(),
        wrapper,
        alicia_scheduler::DEFAULT_WORKER_POOL_SIZE,
        shutdown,
    ));

    let pool_runner = pool.clone();
    tokio::spawn(async move { pool_runner.run().await });

    let api_state = alicia_scheduler::SchedulerApiState { state, pool };
    let app = alicia_scheduler::router(api_state);
    tokio::spawn(async move {
        if let Ok(listener) = tokio::net::TcpListener::bind("0.0.0.0:8083").await {
            let _ = axum::serve(listener, app).await;
        }
    });
}
