//! Wiring adapters: concrete implementations of the trait seams the
//! individual service crates expose, so none of them needs a hard
//! dependency on another just to be launched together.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alicia_balancer::{select, Algorithm, BalancerError, InstancePool};
use alicia_bus::ServiceWrapper;
use alicia_core::{AliciaError, Destination, Payload};
use alicia_gateway::TokenIssuer;
use alicia_registry::TokenVerifier as RegistryTokenVerifier;
use alicia_voice::ServiceCaller;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Lets the registry's write API check scopes against the gateway's token
/// format without the registry crate depending on the gateway crate.
pub struct GatewayTokenVerifier {
    issuer: Arc<TokenIssuer>,
}

impl GatewayTokenVerifier {
    pub fn new(issuer: Arc<TokenIssuer>) -> Self {
        Self { issuer }
    }
}

impl RegistryTokenVerifier for GatewayTokenVerifier {
    fn has_scope(&self, token: &str, required_scope: &str) -> bool {
        match self.issuer.verify(token) {
            Ok(verified) => verified
                .scopes
                .iter()
                .any(|scope| scope == required_scope || scope == "*"),
            Err(_) => false,
        }
    }
}

/// Routes a voice session's capability calls through the load balancer's
/// instance selection, then over the bus with `ServiceWrapper::request`.
/// One `InstancePool` per capability, guarded by its own lock per the
/// substrate's fine-grained-locking resource policy.
pub struct BalancedServiceCaller {
    wrapper: Arc<ServiceWrapper>,
    pools: Mutex<HashMap<String, InstancePool>>,
    algorithm: Algorithm,
}

impl BalancedServiceCaller {
    pub fn new(wrapper: Arc<ServiceWrapper>, algorithm: Algorithm) -> Self {
        Self {
            wrapper,
            pools: Mutex::new(HashMap::new()),
            algorithm,
        }
    }

    pub async fn register_instance(&self, capability: &str, instance: alicia_balancer::InstanceRecord) {
        let mut pools = self.pools.lock().await;
        pools.entry(capability.to_string()).or_insert_with(InstancePool::new).upsert(instance);
    }
}

#[async_trait]
impl ServiceCaller for BalancedServiceCaller {
    async fn call(&self, capability: &str, payload: Payload, timeout: Duration) -> Result<Payload, AliciaError> {
        let instance_id = {
            let mut pools = self.pools.lock().await;
            let pool = pools
                .get_mut(capability)
                .ok_or_else(|| AliciaError::ServiceUnavailable(format!("no instances for {capability}")))?;
            select(pool, self.algorithm).map_err(|err| match err {
                BalancerError::NoInstances => AliciaError::ServiceUnavailable(format!("no instances for {capability}")),
                BalancerError::Busy => AliciaError::Overloaded(format!("{capability} at capacity")),
            })?
        };

        {
            let mut pools = self.pools.lock().await;
            if let Some(record) = pools.get_mut(capability).and_then(|p| p.instances.get_mut(&instance_id)) {
                record.acquire();
            }
        }

        let result = self
            .wrapper
            .request(
                format!("alicia/capabilities/{capability}/{instance_id}"),
                Destination::Capability(capability.to_string()),
                payload,
                timeout,
            )
            .await;

        {
            let mut pools = self.pools.lock().await;
            if let Some(record) = pools.get_mut(capability).and_then(|p| p.instances.get_mut(&instance_id)) {
                record.release();
                match &result {
                    Ok(_) => record.breaker.on_success(),
                    Err(_) => record.breaker.on_failure(),
                }
            }
        }

        result.map(|envelope| envelope.payload)
    }
}
