//! HTTP read/write API: `GET /devices`, `GET /services`, `GET
//! /services/by-capability/{cap}`, `GET /services/{service_name}/instances`,
//! plus a write surface reserved for the Discovery subscriber's own
//! updates. Write access is gated by a pluggable token verifier so this
//! crate doesn't need a hard dependency on the gateway's token format.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use alicia_core::{DeviceDescriptor, ServiceDescriptor};

use crate::registry::Registry;

/// Verifies a bearer token carries the scope required for a write
/// operation. Implemented against the gateway's `TokenIssuer` at the
/// launcher's wiring point.
pub trait TokenVerifier: Send + Sync {
    fn has_scope(&self, token: &str, required_scope: &str) -> bool;
}

pub struct RegistryApiState {
    registry: Arc<Registry>,
    verifier: Arc<dyn TokenVerifier>,
}

impl RegistryApiState {
    pub fn new(registry: Arc<Registry>, verifier: Arc<dyn TokenVerifier>) -> Arc<Self> {
        Arc::new(Self { registry, verifier })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

async fn list_devices(State(state): State<Arc<RegistryApiState>>) -> Json<Vec<DeviceDescriptor>> {
    Json(state.registry.devices().await)
}

async fn list_services(State(state): State<Arc<RegistryApiState>>) -> Json<Vec<ServiceDescriptor>> {
    Json(state.registry.services().await)
}

async fn by_capability(
    State(state): State<Arc<RegistryApiState>>,
    Path(capability): Path<String>,
) -> Json<Vec<ServiceDescriptor>> {
    Json(state.registry.by_capability(&capability).await)
}

async fn instances_of(
    State(state): State<Arc<RegistryApiState>>,
    Path(service_name): Path<String>,
) -> Json<Vec<ServiceDescriptor>> {
    Json(state.registry.instances_of(&service_name).await)
}

#[derive(Deserialize)]
struct UpsertDeviceRequest {
    device: DeviceDescriptor,
}

async fn upsert_device(
    State(state): State<Arc<RegistryApiState>>,
    headers: HeaderMap,
    Json(req): Json<UpsertDeviceRequest>,
) -> Response {
    let authorized = bearer_token(&headers)
        .map(|token| state.verifier.has_scope(token, "registry:write"))
        .unwrap_or(false);
    if !authorized {
        return (StatusCode::FORBIDDEN, Json(serde_json::json!({ "error": "forbidden" }))).into_response();
    }
    state.registry.upsert_device(req.device).await;
    StatusCode::NO_CONTENT.into_response()
}

pub fn router(state: Arc<RegistryApiState>) -> Router {
    Router::new()
        .route("/devices", get(list_devices))
        .route("/devices", post(upsert_device))
        .route("/services", get(list_services))
        .route("/services/by-capability/{capability}", get(by_capability))
        .route("/services/{service_name}/instances", get(instances_of))
        .with_state(state)
}
