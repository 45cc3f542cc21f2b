//! Voice Router: the multi-hop STT -> dialog -> TTS session state machine.

pub mod budget;
pub mod router;
pub mod session;

pub use router::VoiceRouter;
pub use session::{FailureReason, Session, ServiceCaller, SessionState};
