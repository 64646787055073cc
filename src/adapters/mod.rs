//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `tfhe`: tfhe-rs for FHE operations
//! - `sqlite`: SQLite for durable storage and credentials
//! - `sanitize`: PII filtering for logs

pub mod sanitize;
pub mod sqlite;
pub mod tfhe;

// Re-export storage error for lib.rs
pub use sqlite::{SqliteStore, StorageError};
