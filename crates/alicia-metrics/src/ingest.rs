//! Metric ingestion surfaces: a bus handler on `alicia/metrics/ingest` for
//! services publishing their own counters, and an HTTP `POST /metrics` for
//! callers that would rather not hold a broker connection open.

use std::sync::Arc;

use alicia_bus::ServiceWrapper;
use alicia_core::{topics, AliciaError};
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use rumqttc::QoS;
use tracing::warn;

use crate::sample::MetricSample;
use crate::store::MetricStore;

/// Register the ingest handler against the service wrapper's dispatch
/// table. Call once at startup, after `ServiceWrapper::start`.
pub async fn install(wrapper: Arc<ServiceWrapper>, store: Arc<MetricStore>) -> Result<(), AliciaError> {
    wrapper
        .register_handler(
            topics::METRICS_INGEST,
            QoS::AtLeastOnce,
            Arc::new(move |envelope| {
                let store = store.clone();
                Box::pin(async move {
                    match envelope.payload.decode::<Vec<MetricSample>>() {
                        Ok(samples) => {
                            for sample in samples {
                                store.ingest(sample);
                            }
                        }
                        Err(err) => warn!(error = %err, "dropping malformed metric ingest envelope"),
                    }
                })
            }),
        )
        .await
}

#[derive(Clone)]
pub struct IngestApiState {
    pub store: Arc<MetricStore>,
}

pub fn router(state: IngestApiState) -> Router {
    Router::new()
        .route("/metrics", post(post_metrics))
        .with_state(state)
}

async fn post_metrics(State(state): State<IngestApiState>, Json(samples): Json<Vec<MetricSample>>) {
    for sample in samples {
        state.store.ingest(sample);
    }
}
