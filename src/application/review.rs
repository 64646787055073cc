//! Review service: authorized status transitions, listing and audit reads.

use std::sync::Arc;

use crate::adapters::StorageError;
use crate::application::SessionGate;
use crate::domain::{
    Action, Application, ApplicationStatus, AuditEntry, StatusFilter, TransitionOutcome,
};
use crate::ports::{ApplicationStore, CredentialStore, StatusCounts};
use crate::PortalError;

/// Service for the admissions review workflow.
pub struct ReviewService<S, C>
where
    S: ApplicationStore,
    C: CredentialStore,
{
    store: Arc<S>,
    gate: Arc<SessionGate<C>>,
}

impl<S, C> ReviewService<S, C>
where
    S: ApplicationStore,
    C: CredentialStore,
    S::Error: Into<StorageError>,
    C::Error: Into<StorageError>,
{
    /// Create a new review service.
    pub fn new(store: Arc<S>, gate: Arc<SessionGate<C>>) -> Self {
        Self { store, gate }
    }

    /// Apply a status transition on behalf of the session holder.
    ///
    /// The actor recorded in the audit trail is the authenticated account,
    /// not caller-supplied input.
    ///
    /// # Errors
    /// - `Auth` when the token is missing, expired or under-privileged
    /// - `Validation` for an unknown application id
    /// - `Transition` for a disallowed transition (state is left unchanged)
    pub fn transition(
        &self,
        token: &str,
        id: &str,
        target: ApplicationStatus,
    ) -> crate::Result<TransitionOutcome> {
        let session = self.gate.authorize(token, Action::TransitionStatus)?;

        match self.store.transition_status(id, target, &session.email) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                let storage_err: StorageError = e.into();
                match storage_err {
                    StorageError::Transition(te) => Err(te.into()),
                    StorageError::NotFound(id) => Err(PortalError::Validation(format!(
                        "unknown application id '{id}'"
                    ))),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// List applications matching a status filter, in submission order.
    ///
    /// # Errors
    /// Returns `Auth` errors for bad sessions, `Storage` on read failure.
    pub fn list(&self, token: &str, filter: StatusFilter) -> crate::Result<Vec<Application>> {
        self.gate.authorize(token, Action::ReviewApplications)?;
        self.store
            .list(filter)
            .map_err(|e| PortalError::Storage(e.into()))
    }

    /// Dashboard totals per status.
    ///
    /// # Errors
    /// Returns `Auth` errors for bad sessions, `Storage` on read failure.
    pub fn counts(&self, token: &str) -> crate::Result<StatusCounts> {
        self.gate.authorize(token, Action::ReviewApplications)?;
        self.store
            .count_by_status()
            .map_err(|e| PortalError::Storage(e.into()))
    }

    /// Audit trail for one application, oldest entry first.
    ///
    /// # Errors
    /// Returns `Auth` errors for bad sessions, `Storage` on read failure.
    pub fn audit(&self, token: &str, id: &str) -> crate::Result<Vec<AuditEntry>> {
        self.gate.authorize(token, Action::ReviewApplications)?;
        self.store
            .audit_entries(id)
            .map_err(|e| PortalError::Storage(e.into()))
    }
}
