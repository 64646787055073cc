//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement the portal's
//! external operations: submission, login, review transitions and aggregate
//! reports.

mod aggregation;
mod review;
mod session;
mod submission;

pub use aggregation::{
    decrypt_report, AggregateReport, AggregationService, CategoryCount, DecryptedReport,
};
pub use review::ReviewService;
pub use session::SessionGate;
pub use submission::{SubmissionRequest, SubmissionService};

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::adapters::StorageError;
use crate::config::PortalConfig;
use crate::domain::{
    AdminSession, Application, ApplicationStatus, AuditEntry, StatusFilter, TransitionOutcome,
};
use crate::ports::{ApplicationStore, CredentialStore, FheEngine, StatusCounts};

/// Run a blocking operation on a worker thread, bounded by `timeout`.
///
/// On expiry the worker thread is left to finish on its own and its result is
/// dropped; the caller gets an explicit `Timeout` error instead of blocking
/// indefinitely.
pub(crate) fn run_with_timeout<T, F>(
    operation: &'static str,
    timeout: Duration,
    f: F,
) -> crate::Result<T>
where
    F: FnOnce() -> crate::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, "Operation exceeded its timeout");
            Err(crate::PortalError::Timeout(operation))
        }
    }
}

/// Facade wiring the portal's services over shared adapters.
///
/// One instance per process; this is the programmatic surface an HTTP layer
/// or admin console would sit on top of.
pub struct Portal<F, S, C>
where
    F: FheEngine + 'static,
    S: ApplicationStore,
    C: CredentialStore,
{
    submission: SubmissionService<F, S>,
    review: ReviewService<S, C>,
    aggregation: AggregationService<F, S, C>,
    gate: Arc<SessionGate<C>>,
}

impl<F, S, C> Portal<F, S, C>
where
    F: FheEngine + 'static,
    S: ApplicationStore,
    C: CredentialStore,
    S::Error: Into<StorageError>,
    C::Error: Into<StorageError>,
{
    /// Wire the portal services over the given adapters.
    pub fn new(fhe: Arc<F>, store: Arc<S>, creds: Arc<C>, config: PortalConfig) -> Self {
        let gate = Arc::new(SessionGate::new(creds, &config));
        Self {
            submission: SubmissionService::new(
                Arc::clone(&fhe),
                Arc::clone(&store),
                config,
            ),
            review: ReviewService::new(Arc::clone(&store), Arc::clone(&gate)),
            aggregation: AggregationService::new(fhe, store, Arc::clone(&gate)),
            gate,
        }
    }

    /// Submission endpoint: accept an application, return the stored record.
    ///
    /// # Errors
    /// See [`SubmissionService::submit`].
    pub fn submit(&self, request: SubmissionRequest) -> crate::Result<Application> {
        self.submission.submit(request)
    }

    /// Admin login endpoint.
    ///
    /// # Errors
    /// See [`SessionGate::authenticate`].
    pub fn login(&self, email: &str, password: &str) -> crate::Result<AdminSession> {
        self.gate.authenticate(email, password)
    }

    /// Drop a session.
    pub fn logout(&self, token: &str) {
        self.gate.revoke(token);
    }

    /// Status transition endpoint.
    ///
    /// # Errors
    /// See [`ReviewService::transition`].
    pub fn transition(
        &self,
        token: &str,
        id: &str,
        target: ApplicationStatus,
    ) -> crate::Result<TransitionOutcome> {
        self.review.transition(token, id, target)
    }

    /// Review listing endpoint.
    ///
    /// # Errors
    /// See [`ReviewService::list`].
    pub fn list(&self, token: &str, filter: StatusFilter) -> crate::Result<Vec<Application>> {
        self.review.list(token, filter)
    }

    /// Dashboard totals.
    ///
    /// # Errors
    /// See [`ReviewService::counts`].
    pub fn counts(&self, token: &str) -> crate::Result<StatusCounts> {
        self.review.counts(token)
    }

    /// Audit trail for one application.
    ///
    /// # Errors
    /// See [`ReviewService::audit`].
    pub fn audit(&self, token: &str, id: &str) -> crate::Result<Vec<AuditEntry>> {
        self.review.audit(token, id)
    }

    /// Aggregate report endpoint (encrypted counts; decryption happens at
    /// the key holder).
    ///
    /// # Errors
    /// See [`AggregationService::aggregate`].
    pub fn aggregate(&self, token: &str, field: &str) -> crate::Result<AggregateReport> {
        self.aggregation.aggregate(token, field)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStore;
    use crate::adapters::tfhe::TfheAdapter;
    use crate::domain::{kdf, AuthError, Role, SecretKey};
    use crate::PortalError;

    fn portal_with_keys() -> (
        Portal<TfheAdapter, SqliteStore, SqliteStore>,
        Arc<TfheAdapter>,
        SecretKey,
    ) {
        let fhe = Arc::new(TfheAdapter::new());
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));

        let keys = fhe.generate_keys().expect("keys");
        store
            .save_portal_keys(&keys.portal_keys())
            .expect("install keys");

        let hash = kdf::hash_password("portal-pass-1").expect("hash");
        store
            .upsert_account("registrar@university.edu", &hash, Role::Registrar)
            .expect("provision");

        let portal = Portal::new(
            Arc::clone(&fhe),
            Arc::clone(&store),
            store,
            PortalConfig::default(),
        );
        (portal, fhe, keys.secret)
    }

    #[test]
    fn test_run_with_timeout_expires() {
        let err = run_with_timeout("sleepy", Duration::from_millis(50), || {
            std::thread::sleep(Duration::from_secs(5));
            Ok(())
        })
        .expect_err("must time out");
        assert!(matches!(err, PortalError::Timeout("sleepy")));
    }

    #[test]
    fn test_run_with_timeout_passes_result_through() {
        let value = run_with_timeout("quick", Duration::from_secs(5), || Ok(41 + 1))
            .expect("Should complete");
        assert_eq!(value, 42);
    }

    #[test]
    fn test_full_workflow_end_to_end() {
        let (portal, fhe, secret) = portal_with_keys();

        // Applicant submits with sensitive answers.
        let application = portal
            .submit(SubmissionRequest::new(
                "Ada Lovelace",
                "ada@example.edu",
                &[("gender", "female"), ("ethnicity", "asian")],
            ))
            .expect("Should submit");
        assert_eq!(application.status, ApplicationStatus::Pending);

        // Staff logs in, reviews, approves twice (idempotent).
        let session = portal
            .login("registrar@university.edu", "portal-pass-1")
            .expect("Should log in");

        let listed = portal
            .list(&session.token, StatusFilter::All)
            .expect("Should list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].full_name, "Ada Lovelace");

        let first = portal
            .transition(&session.token, &application.id, ApplicationStatus::Approved)
            .expect("Should approve");
        assert!(matches!(first, TransitionOutcome::Applied { .. }));
        let second = portal
            .transition(&session.token, &application.id, ApplicationStatus::Approved)
            .expect("Re-approval is a no-op");
        assert_eq!(second, TransitionOutcome::NoOp);

        let audit = portal
            .audit(&session.token, &application.id)
            .expect("Should read audit");
        assert_eq!(audit.len(), 1);

        let counts = portal.counts(&session.token).expect("Should count");
        assert_eq!(counts.approved, 1);

        // Registrar pulls an encrypted report; key holder decrypts it.
        let report = portal
            .aggregate(&session.token, "gender")
            .expect("Should aggregate");
        let decrypted =
            decrypt_report(fhe.as_ref(), &report, &secret).expect("Should decrypt");
        assert_eq!(decrypted.counts.get("female"), Some(&1));

        // Logout invalidates the capability.
        portal.logout(&session.token);
        assert!(matches!(
            portal.list(&session.token, StatusFilter::All),
            Err(PortalError::Auth(AuthError::InvalidCredentials))
        ));
    }
}
