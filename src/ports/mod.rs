//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (FHE library, storage,
//! credential backend).

mod credentials;
mod fhe_engine;
mod store;

pub use credentials::{AdminAccount, CredentialStore};
pub use fhe_engine::FheEngine;
pub use store::{ApplicationStore, StatusCounts};
