//! Shared data model, error taxonomy, config loading, and logging
//! bootstrap used by every Alicia substrate crate.

pub mod config;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod topics;

pub use config::Config;
pub use descriptor::{CapabilityIndex, DeviceDescriptor, ServiceDescriptor, ServiceStatus};
pub use envelope::{Destination, Envelope, MessageType, Payload, Priority, Routing, SecurityBlock};
pub use error::{AliciaError, ErrorReason, Result};
