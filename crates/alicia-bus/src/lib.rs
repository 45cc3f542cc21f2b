//! Service Wrapper: the MQTT-backed substrate every `alicia-*` service
//! embeds for publish/subscribe, request/reply, heartbeating, and health
//! reporting.

pub mod filter;
pub mod handler;
pub mod health;
pub mod heartbeat;
pub mod reconnect;
pub mod reqrep;
pub mod wrapper;

pub use handler::{HandlerFn, HandlerFuture, HandlerTable};
pub use health::{HealthState, Status};
pub use heartbeat::HeartbeatTask;
pub use reconnect::Backoff;
pub use reqrep::PendingReplies;
pub use wrapper::ServiceWrapper;
