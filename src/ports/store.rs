//! Store port: Trait for durable application persistence.
//!
//! This trait abstracts the storage backend (SQLite) from the application
//! logic. Records are append-only: applications are never deleted, and every
//! effective status transition leaves an audit entry.

use crate::domain::{
    Application, ApplicationStatus, AuditEntry, PortalKeys, SensitiveCiphertext, StatusFilter,
    TransitionOutcome,
};

/// Per-status totals for the review dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
}

impl StatusCounts {
    /// Total number of applications received.
    #[must_use]
    pub fn total(&self) -> usize {
        self.pending + self.approved + self.rejected
    }
}

/// Trait for durable storage operations.
///
/// Implementations must make `submit` and `transition_status` atomic: a
/// reader never observes an application without its ciphertexts, or a status
/// change without its audit entry.
pub trait ApplicationStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a new application together with its sensitive-field
    /// ciphertexts.
    ///
    /// # Errors
    /// Returns error if the write fails or the id already exists.
    fn submit(&self, application: &Application) -> Result<(), Self::Error>;

    /// Load one application by id.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn get(&self, id: &str) -> Result<Option<Application>, Self::Error>;

    /// Apply a status transition on behalf of `actor`.
    ///
    /// Runs in a single transaction: concurrent transitions on the same id
    /// serialize, the loser observing the post-transition state. An
    /// idempotent re-application returns `TransitionOutcome::NoOp` without
    /// recording an audit entry.
    ///
    /// # Errors
    /// Returns error if the id is unknown, the transition is disallowed, or
    /// the write fails.
    fn transition_status(
        &self,
        id: &str,
        target: ApplicationStatus,
        actor: &str,
    ) -> Result<TransitionOutcome, Self::Error>;

    /// List applications matching `filter`, in stable insertion order.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn list(&self, filter: StatusFilter) -> Result<Vec<Application>, Self::Error>;

    /// Per-status totals.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn count_by_status(&self) -> Result<StatusCounts, Self::Error>;

    /// Audit trail for one application, oldest first.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn audit_entries(&self, id: &str) -> Result<Vec<AuditEntry>, Self::Error>;

    /// Consistent snapshot of every stored ciphertext for one sensitive
    /// field, in insertion order. Used by aggregation.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn field_ciphertexts(&self, field: &str) -> Result<Vec<SensitiveCiphertext>, Self::Error>;

    /// Install the portal's public key material (encryption + evaluation).
    ///
    /// The secret key has no storage operation on purpose.
    ///
    /// # Errors
    /// Returns error if the write fails.
    fn save_portal_keys(&self, keys: &PortalKeys) -> Result<(), Self::Error>;

    /// Load the installed portal key material.
    ///
    /// # Returns
    /// `None` if no keys have been installed yet.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn load_portal_keys(&self) -> Result<Option<PortalKeys>, Self::Error>;

    /// Check whether portal key material is installed.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn has_portal_keys(&self) -> Result<bool, Self::Error>;
}
