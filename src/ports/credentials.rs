//! Credential store port: admin account lookup and provisioning.
//!
//! Staff credentials live in the store as Argon2id PHC hash strings; there
//! are no hardcoded accounts.

use crate::domain::Role;

/// A provisioned admin account.
#[derive(Clone)]
pub struct AdminAccount {
    pub email: String,

    /// Argon2id PHC hash string of the account password
    pub password_hash: String,

    pub role: Role,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

// Keep the password hash out of Debug output; it is not plaintext, but there
// is no reason for it to appear in logs either.
impl std::fmt::Debug for AdminAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminAccount")
            .field("email", &self.email)
            .field("role", &self.role)
            .field("created_at", &self.created_at)
            .field("password_hash", &"[redacted]")
            .finish()
    }
}

/// Trait for credential storage operations.
pub trait CredentialStore: Send + Sync {
    /// Error type for credential operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Look up the account for `email`.
    ///
    /// # Returns
    /// `None` if no such account exists.
    ///
    /// # Errors
    /// Returns error if the read fails.
    fn find_account(&self, email: &str) -> Result<Option<AdminAccount>, Self::Error>;

    /// Create or replace an account.
    ///
    /// # Errors
    /// Returns error if the write fails.
    fn upsert_account(
        &self,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<(), Self::Error>;
}
