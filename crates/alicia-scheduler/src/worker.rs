//! Fixed worker pool draining due events: a bounded `tokio::sync::Semaphore`
//! caps concurrent executions (default 10), mirroring the "bounded ring
//! instead of unbounded queue" resource-model constraint applied to every
//! shared structure in the substrate.

use std::sync::Arc;
use std::time::Duration;

use alicia_bus::ServiceWrapper;
use alicia_core::{Destination, Envelope, MessageType, Payload};
use chrono::Utc;
use tokio::sync::{Notify, Semaphore};
use tracing::{info, warn};

use crate::event::{ExecutionRecord, ExecutionStatus, ScheduledEvent};
use crate::scheduler::SchedulerState;

pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

pub struct WorkerPool {
    state: Arc<SchedulerState>,
    wrapper: Arc<ServiceWrapper>,
    semaphore: Arc<Semaphore>,
    shutdown: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(state: Arc<SchedulerState>, wrapper: Arc<ServiceWrapper>, pool_size: usize, shutdown: Arc<Notify>) -> Self {
        Self {
            state,
            wrapper,
            semaphore: Arc::new(Semaphore::new(pool_size)),
            shutdown,
        }
    }

    pub async fn run(&self) {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.dispatch_due().await;
                }
                _ = self.shutdown.notified() => {
                    info!("scheduler worker pool shutting down");
                    return;
                }
            }
        }
    }

    async fn dispatch_due(&self) {
        for event_id in self.state.due_event_ids() {
            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                // Pool saturated this tick; due events stay due and will be
                // picked up on the next tick.
                continue;
            };
            if self.state.begin_run(&event_id).is_err() {
                continue;
            }
            let Some(event) = self.state.get(&event_id) else {
                continue;
            };
            let state = self.state.clone();
            let wrapper = self.wrapper.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let record = execute(&wrapper, &event).await;
                state.finish_run(record);
            });
        }
    }

    /// Execute a manually triggered event outside the normal schedule,
    /// producing a synthetic `ExecutionRecord` regardless of `next_run`.
    pub async fn trigger_now(&self, event_id: &str) -> Result<ExecutionRecord, crate::scheduler::SchedulerError> {
        let Some(event) = self.state.get(event_id) else {
            return Err(crate::scheduler::SchedulerError::NotFound(event_id.to_string()));
        };
        let record = execute(&self.wrapper, &event).await;
        self.state.finish_run(record.clone());
        Ok(record)
    }
}

async fn execute(wrapper: &ServiceWrapper, event: &ScheduledEvent) -> ExecutionRecord {
    let started_at = Utc::now();
    let payload = Payload::json(event.payload.clone());

    let outcome = if event.expect_response {
        wrapper
            .request(
                event.target_topic.clone(),
                Destination::Broadcast,
                payload,
                Duration::from_secs(event.response_timeout_s),
            )
            .await
            .map(|_| ())
    } else {
        let envelope = Envelope::new("alicia-scheduler", Destination::Broadcast, MessageType::Event, payload);
        wrapper.publish(event.target_topic.clone(), &envelope).await
    };

    let (status, detail) = match outcome {
        Ok(()) => (ExecutionStatus::Completed, String::new()),
        Err(err) => {
            warn!(event_id = %event.event_id, error = %err, "scheduled event execution failed");
            (ExecutionStatus::Failed, err.to_string())
        }
    };

    ExecutionRecord {
        event_id: event.event_id.clone(),
        started_at,
        finished_at: Utc::now(),
        status,
        detail,
    }
}
