//! Operational API: CRUD over `ScheduledEvent`s, manual trigger, and
//! execution history listing.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde::Serialize;

use crate::event::{ExecutionRecord, ScheduledEvent};
use crate::scheduler::{SchedulerError, SchedulerState};
use crate::worker::WorkerPool;

struct ApiError(SchedulerError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            SchedulerError::NotFound(_) => StatusCode::NOT_FOUND,
            SchedulerError::AlreadyExists(_) => StatusCode::CONFLICT,
            SchedulerError::Overlapping(_) => StatusCode::CONFLICT,
        };
        (status, self.0.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct SchedulerApiState {
    pub state: Arc<SchedulerState>,
    pub pool: Arc<WorkerPool>,
}

pub fn router(state: SchedulerApiState) -> Router {
    Router::new()
        .route("/events", get(list_events).post(create_event))
        .route(
            "/events/{event_id}",
            get(get_event).put(update_event).delete(delete_event),
        )
        .route("/events/{event_id}/trigger", post(trigger_event))
        .route("/events/{event_id}/executions", get(list_executions))
        .with_state(state)
}

async fn list_events(State(state): State<SchedulerApiState>) -> Json<Vec<ScheduledEvent>> {
    Json(state.state.list())
}

async fn create_event(
    State(state): State<SchedulerApiState>,
    Json(event): Json<ScheduledEvent>,
) -> Result<StatusCode, ApiError> {
    state.state.create(event).map_err(ApiError)?;
    Ok(StatusCode::CREATED)
}

async fn get_event(
    State(state): State<SchedulerApiState>,
    Path(event_id): Path<String>,
) -> Result<Json<ScheduledEvent>, ApiError> {
    state
        .state
        .get(&event_id)
        .map(Json)
        .ok_or_else(|| ApiError(SchedulerError::NotFound(event_id)))
}

async fn update_event(
    State(state): State<SchedulerApiState>,
    Path(event_id): Path<String>,
    Json(mut event): Json<ScheduledEvent>,
) -> Result<StatusCode, ApiError> {
    event.event_id = event_id;
    state.state.update(event).map_err(ApiError)?;
    Ok(StatusCode::OK)
}

async fn delete_event(
    State(state): State<SchedulerApiState>,
    Path(event_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.state.delete(&event_id).map_err(ApiError)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct TriggerResponse {
    record: ExecutionRecord,
}

async fn trigger_event(
    State(state): State<SchedulerApiState>,
    Path(event_id): Path<String>,
) -> Result<Json<TriggerResponse>, ApiError> {
    let record = state.pool.trigger_now(&event_id).await.map_err(ApiError)?;
    Ok(Json(TriggerResponse { record }))
}

async fn list_executions(
    State(state): State<SchedulerApiState>,
    Path(event_id): Path<String>,
) -> Json<Vec<ExecutionRecord>> {
    Json(state.state.history(&event_id))
}
