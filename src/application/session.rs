//! Session gate: staff authentication and capability checks.
//!
//! Credentials are verified against the credential store (Argon2id PHC
//! hashes); successful logins are issued an unpredictable bearer token with a
//! configured TTL. Every store-mutating and aggregate operation passes
//! through [`SessionGate::authorize`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::application::run_with_timeout;
use crate::config::PortalConfig;
use crate::domain::{kdf, new_token, Action, AdminSession, AuthError};
use crate::ports::CredentialStore;
use crate::PortalError;

/// Gate issuing and checking admin sessions.
///
/// Sessions live in memory on purpose: a portal restart invalidates every
/// outstanding token and staff simply log in again. Applications, audit
/// entries and credentials are the durable state, not capabilities.
pub struct SessionGate<C>
where
    C: CredentialStore,
{
    creds: Arc<C>,
    sessions: Mutex<HashMap<String, AdminSession>>,
    session_ttl: chrono::Duration,
    op_timeout: Duration,
}

impl<C> SessionGate<C>
where
    C: CredentialStore,
    C::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new session gate.
    pub fn new(creds: Arc<C>, config: &PortalConfig) -> Self {
        Self {
            creds,
            sessions: Mutex::new(HashMap::new()),
            session_ttl: config.session_ttl,
            op_timeout: config.op_timeout,
        }
    }

    /// Authenticate staff credentials and issue a session.
    ///
    /// The Argon2id verification is deliberately slow, so it runs on a worker
    /// thread under the operation timeout.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCredentials` for an unknown account or a
    /// wrong password (indistinguishable to the caller), `Timeout` if
    /// verification exceeds the configured bound.
    pub fn authenticate(&self, email: &str, password: &str) -> crate::Result<AdminSession> {
        let account = self
            .creds
            .find_account(email)
            .map_err(|e| PortalError::Storage(e.into()))?
            .ok_or(AuthError::InvalidCredentials)?;

        let stored_hash = account.password_hash.clone();
        let presented = zeroize::Zeroizing::new(password.to_string());
        let verified = run_with_timeout("authenticate", self.op_timeout, move || {
            Ok(kdf::verify_password(&stored_hash, &presented))
        })?;

        if !verified {
            tracing::warn!("Rejected login attempt");
            return Err(AuthError::InvalidCredentials.into());
        }

        let session = AdminSession {
            token: new_token(),
            email: account.email,
            role: account.role,
            expires_at: chrono::Utc::now() + self.session_ttl,
        };

        self.sessions
            .lock()
            .expect("session lock poisoned")
            .insert(session.token.clone(), session.clone());

        tracing::info!(role = %session.role, "Admin session issued");
        Ok(session)
    }

    /// Check a bearer token against an action.
    ///
    /// Expired sessions are evicted on sight.
    ///
    /// # Errors
    /// Returns `AuthError::InvalidCredentials` for unknown tokens,
    /// `SessionExpired` past the TTL, and `Forbidden` when the session's role
    /// does not permit `action`.
    pub fn authorize(&self, token: &str, action: Action) -> crate::Result<AdminSession> {
        let mut sessions = self.sessions.lock().expect("session lock poisoned");

        let Some(session) = sessions.get(token) else {
            return Err(AuthError::InvalidCredentials.into());
        };

        if session.is_expired_at(chrono::Utc::now()) {
            sessions.remove(token);
            return Err(AuthError::SessionExpired.into());
        }

        if !session.role.permits(action) {
            tracing::warn!(role = %session.role, ?action, "Forbidden");
            return Err(AuthError::Forbidden.into());
        }

        Ok(session.clone())
    }

    /// Drop a session (logout). Unknown tokens are ignored.
    pub fn revoke(&self, token: &str) {
        self.sessions
            .lock()
            .expect("session lock poisoned")
            .remove(token);
    }

    /// Number of live (possibly expired but not yet evicted) sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("session lock poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStore;
    use crate::domain::kdf::hash_password;
    use crate::domain::Role;
    use crate::ports::CredentialStore as _;

    fn gate_with_account(role: Role, ttl_minutes: i64) -> SessionGate<SqliteStore> {
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        let hash = hash_password("open-sesame-42").expect("hash");
        store
            .upsert_account("staff@university.edu", &hash, role)
            .expect("provision");

        let mut config = PortalConfig::default();
        config.session_ttl = chrono::Duration::minutes(ttl_minutes);
        SessionGate::new(store, &config)
    }

    #[test]
    fn test_login_and_authorize() {
        let gate = gate_with_account(Role::Reviewer, 30);

        let session = gate
            .authenticate("staff@university.edu", "open-sesame-42")
            .expect("Should authenticate");

        let authorized = gate
            .authorize(&session.token, Action::TransitionStatus)
            .expect("Should authorize");
        assert_eq!(authorized.email, "staff@university.edu");
    }

    #[test]
    fn test_wrong_password_rejected() {
        let gate = gate_with_account(Role::Reviewer, 30);
        let err = gate
            .authenticate("staff@university.edu", "not-the-password")
            .expect_err("must fail");
        assert!(matches!(
            err,
            PortalError::Auth(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_unknown_account_rejected() {
        let gate = gate_with_account(Role::Reviewer, 30);
        let err = gate
            .authenticate("nobody@university.edu", "open-sesame-42")
            .expect_err("must fail");
        assert!(matches!(
            err,
            PortalError::Auth(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_unknown_token_rejected() {
        let gate = gate_with_account(Role::Reviewer, 30);
        let err = gate
            .authorize("not-a-token", Action::ReviewApplications)
            .expect_err("must fail");
        assert!(matches!(
            err,
            PortalError::Auth(AuthError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_expired_session_evicted() {
        // TTL in the past: the session is expired the moment it is issued.
        let gate = gate_with_account(Role::Reviewer, -1);
        let session = gate
            .authenticate("staff@university.edu", "open-sesame-42")
            .expect("Should authenticate");

        let err = gate
            .authorize(&session.token, Action::ReviewApplications)
            .expect_err("must fail");
        assert!(matches!(err, PortalError::Auth(AuthError::SessionExpired)));
        assert_eq!(gate.session_count(), 0);
    }

    #[test]
    fn test_reviewer_cannot_aggregate() {
        let gate = gate_with_account(Role::Reviewer, 30);
        let session = gate
            .authenticate("staff@university.edu", "open-sesame-42")
            .expect("Should authenticate");

        let err = gate
            .authorize(&session.token, Action::AggregateReport)
            .expect_err("must fail");
        assert!(matches!(err, PortalError::Auth(AuthError::Forbidden)));
    }

    #[test]
    fn test_revoked_token_rejected() {
        let gate = gate_with_account(Role::Registrar, 30);
        let session = gate
            .authenticate("staff@university.edu", "open-sesame-42")
            .expect("Should authenticate");

        gate.revoke(&session.token);
        assert!(gate
            .authorize(&session.token, Action::ReviewApplications)
            .is_err());
    }
}
