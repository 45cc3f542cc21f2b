//! The admission HTTP API: `/auth/service`, `/auth/verify`, `/keys/rotate`,
//! `/topics/declare`, `/topics/sensitive`. Axum router + extractor-based
//! shared state (`Router::new().route(...)`, `State<Arc<_>>`).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Duration as ChronoDuration;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, warn};

use alicia_core::AliciaError;

use crate::cert::CaTrustStore;
use crate::keys::KeyStore;
use crate::ratelimit::RateLimiter;
use crate::token::TokenIssuer;
use crate::topics::SensitiveTopicRegistry;

const SERVICE_TOKEN_TTL_MINUTES: i64 = 60;

pub struct GatewayState {
    ca_trust: CaTrustStore,
    issuer: TokenIssuer,
    keys: RwLock<KeyStore>,
    denylist: RwLock<std::collections::HashSet<String>>,
    sensitive_topics: RwLock<SensitiveTopicRegistry>,
    rate_limiter: RwLock<RateLimiter>,
}

impl GatewayState {
    pub fn new(ca_trust: CaTrustStore, issuer: TokenIssuer, keys: KeyStore) -> Arc<Self> {
        Arc::new(Self {
            ca_trust,
            issuer,
            keys: RwLock::new(keys),
            denylist: RwLock::new(std::collections::HashSet::new()),
            sensitive_topics: RwLock::new(SensitiveTopicRegistry::new()),
            rate_limiter: RwLock::new(RateLimiter::new(std::time::Duration::from_secs(60), 30)),
        })
    }

    pub async fn deny(&self, service_name: impl Into<String>) {
        self.denylist.write().await.insert(service_name.into());
    }
}

struct ApiError(AliciaError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.reason() {
            alicia_core::ErrorReason::Unauthorized => StatusCode::UNAUTHORIZED,
            alicia_core::ErrorReason::Forbidden => StatusCode::FORBIDDEN,
            alicia_core::ErrorReason::BadRequest => StatusCode::BAD_REQUEST,
            alicia_core::ErrorReason::Overloaded => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.0.user_message() }))).into_response()
    }
}

impl From<AliciaError> for ApiError {
    fn from(err: AliciaError) -> Self {
        Self(err)
    }
}

#[derive(Deserialize)]
struct AuthServiceRequest {
    certificate_pem: String,
}

#[derive(Serialize)]
struct AuthServiceResponse {
    token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
    token_type: &'static str,
}

async fn auth_service(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<AuthServiceRequest>,
) -> Result<Json<AuthServiceResponse>, ApiError> {
    if !state.rate_limiter.write().await.check(addr.ip()) {
        warn!(ip = %addr.ip(), "rate limit exceeded on /auth/service");
        return Err(AliciaError::Overloaded("rate limit exceeded".into()).into());
    }

    let service_name = state.ca_trust.verify_and_extract_cn(&req.certificate_pem)?;

    if state.denylist.read().await.contains(&service_name) {
        warn!(%service_name, "denied credential for denylisted service");
        return Err(AliciaError::Unauthorized("invalid_credential".into()).into());
    }

    let scopes = vec![format!("topic:{service_name}:*")];
    let ttl = ChronoDuration::minutes(SERVICE_TOKEN_TTL_MINUTES);
    let token = state.issuer.issue(&service_name, scopes, ttl)?;
    let expires_at = chrono::Utc::now() + ttl;

    info!(%service_name, "issued service token");
    Ok(Json(AuthServiceResponse {
        token,
        expires_at,
        token_type: "bearer",
    }))
}

#[derive(Deserialize)]
struct AuthVerifyRequest {
    token: String,
}

#[derive(Serialize)]
struct AuthVerifyResponse {
    valid: bool,
    subject: Option<String>,
    scopes: Vec<String>,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

async fn auth_verify(
    State(state): State<Arc<GatewayState>>,
    Json(req): Json<AuthVerifyRequest>,
) -> Json<AuthVerifyResponse> {
    match state.issuer.verify(&req.token) {
        Ok(verified) => Json(AuthVerifyResponse {
            valid: true,
            subject: Some(verified.subject),
            scopes: verified.scopes,
            expires_at: Some(verified.expires_at),
        }),
        Err(_) => Json(AuthVerifyResponse {
            valid: false,
            subject: None,
            scopes: Vec::new(),
            expires_at: None,
        }),
    }
}

#[derive(Serialize)]
struct KeyRotateResponse {
    key_id: String,
}

async fn keys_rotate(State(state): State<Arc<GatewayState>>) -> Json<KeyRotateResponse> {
    let key_id = state.keys.write().await.rotate();
    info!(%key_id, "rotated message encryption key");
    Json(KeyRotateResponse { key_id })
}

#[derive(Deserialize)]
struct DeclareTopicsRequest {
    topics: Vec<String>,
}

#[derive(Serialize)]
struct DeclareTopicsResponse {
    declared: usize,
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// A service declares which topics it owns that carry sensitive payloads,
/// authenticated by the bearer token it obtained from `/auth/service`.
/// Rejected if another live registration already owns one of the topics.
async fn topics_declare(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(req): Json<DeclareTopicsRequest>,
) -> Result<Json<DeclareTopicsResponse>, ApiError> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AliciaError::Unauthorized("missing bearer token".into()))?;
    let verified = state
        .issuer
        .verify(token)
        .map_err(|_| AliciaError::Unauthorized("invalid token".into()))?;

    state
        .sensitive_topics
        .write()
        .await
        .declare(&verified.subject, &req.topics)?;

    info!(service_name = %verified.subject, topics = req.topics.len(), "declared sensitive topics");
    Ok(Json(DeclareTopicsResponse { declared: req.topics.len() }))
}

#[derive(Deserialize)]
struct SensitiveTopicQuery {
    topic: String,
}

#[derive(Serialize)]
struct SensitiveTopicResponse {
    sensitive: bool,
}

async fn topics_is_sensitive(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<SensitiveTopicQuery>,
) -> Json<SensitiveTopicResponse> {
    let sensitive = state.sensitive_topics.read().await.is_sensitive(&query.topic);
    Json(SensitiveTopicResponse { sensitive })
}

pub fn router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/auth/service", post(auth_service))
        .route("/auth/verify", post(auth_verify))
        .route("/keys/rotate", post(keys_rotate))
        .route("/topics/declare", post(topics_declare))
        .route("/topics/sensitive", get(topics_is_sensitive))
        .with_state(state)
}
