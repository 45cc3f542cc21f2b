//! Registry + Discovery: the authoritative service/device directory, its
//! capability index, HTTP read/write API, and snapshot persistence.

pub mod api;
pub mod discovery;
pub mod registry;
pub mod snapshot;

pub use api::{RegistryApiState, TokenVerifier};
pub use registry::{Registry, RegistryError};
pub use snapshot::SnapshotStore;
