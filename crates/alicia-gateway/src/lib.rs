//! Security Gateway: admission HTTP API, X.509 verification, bearer
//! tokens, and AES-256-GCM message-level encryption for sensitive topics.

pub mod admission;
pub mod cert;
pub mod crypto;
pub mod keys;
pub mod ratelimit;
pub mod token;
pub mod topics;

pub use admission::GatewayState;
pub use cert::CaTrustStore;
pub use keys::KeyStore;
pub use token::TokenIssuer;
pub use topics::SensitiveTopicRegistry;
