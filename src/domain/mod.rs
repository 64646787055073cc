//! Domain layer: Core business types and logic.
//!
//! Pure types with strict validation; no adapter dependencies.

mod application;
mod crypto;
pub mod kdf;
mod schema;
mod session;

pub use application::{
    Application, ApplicationStatus, AuditEntry, StatusFilter, TransitionError, TransitionOutcome,
};
pub use crypto::{
    CryptoError, EncryptedCount, EncryptionKey, EvaluationKey, KeySet, PortalKeys, SecretKey,
    SensitiveCiphertext,
};
pub use schema::{Category, FieldSchema, SchemaError, SchemaRegistry, SCHEMA_VERSION_V1};
pub use session::{Action, AdminSession, AuthError, Role};
pub(crate) use session::new_token;
