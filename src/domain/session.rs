//! Admin sessions, roles and the authorization error taxonomy.

use serde::{Deserialize, Serialize};

/// Error type for authentication and authorization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    // Deliberately does not say whether the account or the password was
    // wrong.
    #[error("Authentication failed")]
    InvalidCredentials,

    #[error("Session expired")]
    SessionExpired,

    #[error("Forbidden")]
    Forbidden,
}

/// Staff role attached to an admin account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    /// May list applications and apply status transitions.
    Reviewer,
    /// Reviewer rights plus aggregate-report access.
    Registrar,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reviewer => "reviewer",
            Self::Registrar => "registrar",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "reviewer" => Some(Self::Reviewer),
            "registrar" => Some(Self::Registrar),
            _ => None,
        }
    }

    /// Whether this role may perform `action`.
    #[must_use]
    pub fn permits(self, action: Action) -> bool {
        match action {
            Action::ReviewApplications | Action::TransitionStatus => true,
            Action::AggregateReport => self == Self::Registrar,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations gated by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// List applications, read audit trails and dashboard counts.
    ReviewApplications,
    /// Apply a status transition.
    TransitionStatus,
    /// Run a homomorphic aggregate report.
    AggregateReport,
}

/// An authenticated admin session.
#[derive(Clone, Serialize, Deserialize)]
pub struct AdminSession {
    /// Opaque bearer token
    pub token: String,

    /// Account the session belongs to
    pub email: String,

    /// Role at authentication time
    pub role: Role,

    /// Instant after which the session is no longer valid
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

impl AdminSession {
    /// Whether the session has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        now >= self.expires_at
    }
}

// The bearer token is a capability; keep it out of Debug output.
impl std::fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminSession")
            .field("email", &self.email)
            .field("role", &self.role)
            .field("expires_at", &self.expires_at)
            .field("token", &"[redacted]")
            .finish()
    }
}

/// Generate an unpredictable session token (32 CSPRNG bytes, base64url).
pub(crate) fn new_token() -> String {
    use base64::Engine;
    use rand::RngCore;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let mut bytes = [0u8; 32];
    rng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_permissions() {
        assert!(Role::Reviewer.permits(Action::ReviewApplications));
        assert!(Role::Reviewer.permits(Action::TransitionStatus));
        assert!(!Role::Reviewer.permits(Action::AggregateReport));

        assert!(Role::Registrar.permits(Action::ReviewApplications));
        assert!(Role::Registrar.permits(Action::TransitionStatus));
        assert!(Role::Registrar.permits(Action::AggregateReport));
    }

    #[test]
    fn test_role_roundtrip() {
        assert_eq!(Role::parse("registrar"), Some(Role::Registrar));
        assert_eq!(Role::parse("REVIEWER"), Some(Role::Reviewer));
        assert_eq!(Role::parse("dean"), None);
    }

    #[test]
    fn test_expiry() {
        let now = chrono::Utc::now();
        let session = AdminSession {
            token: new_token(),
            email: "staff@university.edu".to_string(),
            role: Role::Reviewer,
            expires_at: now + chrono::Duration::minutes(5),
        };
        assert!(!session.is_expired_at(now));
        assert!(session.is_expired_at(now + chrono::Duration::minutes(6)));
    }

    #[test]
    fn test_tokens_are_unique_and_opaque() {
        let t1 = new_token();
        let t2 = new_token();
        assert_ne!(t1, t2);
        assert!(t1.len() >= 40); // 32 bytes base64url

        let session = AdminSession {
            token: t1.clone(),
            email: "staff@university.edu".to_string(),
            role: Role::Reviewer,
            expires_at: chrono::Utc::now(),
        };
        let debug_output = format!("{session:?}");
        assert!(!debug_output.contains(&t1));
    }
}
