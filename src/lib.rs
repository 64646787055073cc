//! # Class-glass
//!
//! Privacy-preserving university admissions workflow using Fully Homomorphic
//! Encryption.
//!
//! Applicants submit identity fields (name, email) in plaintext together with
//! sensitive categorical answers (gender, ethnicity). The sensitive answers
//! are encoded to fixed numeric codes under a published schema and encrypted
//! under an FHE public key before they reach the store. Admissions staff move
//! applications through `pending -> approved | rejected` and compute cohort
//! statistics homomorphically over the ciphertexts; the decryption key lives
//! with a separate key-holding party and never enters the portal process.
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (schemas, applications, sessions, keys)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (tfhe-rs, SQLite, log sanitizer)
//! - `application`: Use cases orchestrating domain and ports

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use domain::{Application, ApplicationStatus, FieldSchema, SchemaRegistry};

/// Result type for portal operations.
pub type Result<T> = std::result::Result<T, PortalError>;

/// Main error type for the admissions portal.
#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    #[error("Cryptographic operation failed: {0}")]
    Crypto(#[from] domain::CryptoError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("Invalid submission: {0}")]
    Validation(String),

    #[error(transparent)]
    Schema(#[from] domain::SchemaError),

    #[error("Incomplete submission: {0}")]
    IncompleteSubmission(String),

    #[error(transparent)]
    Transition(#[from] domain::TransitionError),

    #[error(transparent)]
    Auth(#[from] domain::AuthError),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    #[error("Operation timed out: {0}")]
    Timeout(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
