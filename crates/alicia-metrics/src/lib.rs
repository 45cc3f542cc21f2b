//! Metrics Collector: ingests samples over the bus and HTTP, stores them in
//! per-series ring buffers, samples host resource usage, and evaluates
//! alert rules on a fixed interval.

pub mod alerts;
pub mod ingest;
pub mod ring;
pub mod runner;
pub mod sample;
pub mod sampler;
pub mod store;

pub use alerts::{AlertEngine, AlertEvent, AlertRule, AlertTransition, Comparator, Severity};
pub use ring::RingBuffer;
pub use sample::{label_set_hash, MetricKind, MetricSample};
pub use sampler::SystemSampler;
pub use store::{Aggregation, MetricStore};
