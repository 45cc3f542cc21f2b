//! Discovery: subscribes to `alicia/system/discovery/{register,unregister,
//! heartbeat}` and forwards validated events into the Registry.

use std::sync::Arc;

use alicia_bus::ServiceWrapper;
use alicia_core::{topics, AliciaError, ServiceDescriptor};
use rumqttc::QoS;
use serde::Deserialize;
use tracing::warn;

use crate::registry::Registry;

#[derive(Deserialize)]
struct UnregisterPayload {
    instance_id: String,
}

#[derive(Deserialize)]
struct HeartbeatPayload {
    instance_id: String,
}

/// Register the three discovery handlers against the service wrapper's
/// dispatch table. Call once at startup, after `ServiceWrapper::start`.
pub async fn install(wrapper: Arc<ServiceWrapper>, registry: Arc<Registry>) -> Result<(), AliciaError> {
    let registry_register = registry.clone();
    wrapper
        .register_handler(
            topics::DISCOVERY_REGISTER,
            QoS::AtLeastOnce,
            Arc::new(move |envelope| {
                let registry = registry_register.clone();
                Box::pin(async move {
                    match envelope.payload.decode::<ServiceDescriptor>() {
                        Ok(descriptor) => {
                            if let Err(err) = registry.register(descriptor).await {
                                warn!(error = %err, "discovery register rejected");
                            }
                        }
                        Err(err) => warn!(error = %err, "malformed discovery register payload"),
                    }
                })
            }),
        )
        .await?;

    let registry_unregister = registry.clone();
    wrapper
        .register_handler(
            topics::DISCOVERY_UNREGISTER,
            QoS::AtLeastOnce,
            Arc::new(move |envelope| {
                let registry = registry_unregister.clone();
                Box::pin(async move {
                    match envelope.payload.decode::<UnregisterPayload>() {
                        Ok(payload) => registry.unregister(&payload.instance_id).await,
                        Err(err) => warn!(error = %err, "malformed discovery unregister payload"),
                    }
                })
            }),
        )
        .await?;

    let registry_heartbeat = registry.clone();
    wrapper
        .register_handler(
            topics::DISCOVERY_HEARTBEAT,
            QoS::AtMostOnce,
            Arc::new(move |envelope| {
                let registry = registry_heartbeat.clone();
                Box::pin(async move {
                    match envelope.payload.decode::<HeartbeatPayload>() {
                        Ok(payload) => registry.heartbeat(&payload.instance_id).await,
                        Err(err) => warn!(error = %err, "malformed discovery heartbeat payload"),
                    }
                })
            }),
        )
        .await?;

    Ok(())
}
