//! Event Scheduler: `ScheduledEvent` CRUD, once/interval/cron firing over a
//! fixed worker pool, execution history, and manual trigger.

pub mod api;
pub mod event;
pub mod scheduler;
pub mod worker;

pub use api::{router, SchedulerApiState};
pub use event::{ExecutionRecord, ExecutionStatus, ScheduleKind, ScheduledEvent, DEFAULT_WORKER_POOL_SIZE};
pub use scheduler::{SchedulerError, SchedulerState};
pub use worker::WorkerPool;
