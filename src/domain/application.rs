//! Application records and the review status machine.

use serde::{Deserialize, Serialize};

use super::crypto::SensitiveCiphertext;

/// Review status of a submitted application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApplicationStatus {
    /// Awaiting review
    Pending,
    /// Accepted by an admissions reviewer
    Approved,
    /// Declined by an admissions reviewer
    Rejected,
}

impl ApplicationStatus {
    /// Storage representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse the storage representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Apply a requested transition to the current status.
    ///
    /// Only `pending -> approved` and `pending -> rejected` are effective.
    /// Re-applying the status an application already holds is an idempotent
    /// no-op; every other request fails and leaves state unchanged.
    ///
    /// # Errors
    /// Returns `TransitionError::Invalid` for disallowed transitions,
    /// including any attempt to move an application back to `pending`.
    pub fn apply(self, target: ApplicationStatus) -> Result<TransitionOutcome, TransitionError> {
        match (self, target) {
            (Self::Pending, Self::Approved) | (Self::Pending, Self::Rejected) => {
                Ok(TransitionOutcome::Applied { from: self })
            }
            (Self::Approved, Self::Approved) | (Self::Rejected, Self::Rejected) => {
                Ok(TransitionOutcome::NoOp)
            }
            (from, to) => Err(TransitionError::Invalid { from, to }),
        }
    }
}

impl std::fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for disallowed status transitions.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransitionError {
    #[error("Invalid status transition: {from} -> {to}")]
    Invalid {
        from: ApplicationStatus,
        to: ApplicationStatus,
    },
}

/// Result of applying a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The status changed; an audit entry was recorded.
    Applied { from: ApplicationStatus },
    /// The application already held the requested status; nothing changed.
    NoOp,
}

/// A submitted application.
///
/// Identity fields are plaintext by design; the sensitive categorical answers
/// exist only as ciphertexts from the moment the record is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Application {
    /// Unique identifier (UUID v4)
    pub id: String,

    /// Applicant's full name (plaintext identity field)
    pub full_name: String,

    /// Applicant's email (plaintext identity field)
    pub email: String,

    /// Review status
    pub status: ApplicationStatus,

    /// Schema version the sensitive answers were encoded under
    pub schema_version: u32,

    /// One ciphertext per sensitive field on the form
    pub sensitive_fields: Vec<SensitiveCiphertext>,

    /// Submission timestamp
    pub submitted_at: chrono::DateTime<chrono::Utc>,
}

impl Application {
    /// Create a new pending application with a fresh id and timestamp.
    #[must_use]
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        schema_version: u32,
        sensitive_fields: Vec<SensitiveCiphertext>,
    ) -> Self {
        Self {
            id: uuid_v4(),
            full_name: full_name.into(),
            email: email.into(),
            status: ApplicationStatus::Pending,
            schema_version,
            sensitive_fields,
            submitted_at: chrono::Utc::now(),
        }
    }

    /// Ciphertext for a named sensitive field, if present.
    #[must_use]
    pub fn ciphertext(&self, field: &str) -> Option<&SensitiveCiphertext> {
        self.sensitive_fields.iter().find(|c| c.field == field)
    }
}

/// Filter for listing applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFilter {
    All,
    Status(ApplicationStatus),
}

/// One line of the append-only review audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub application_id: String,
    pub actor: String,
    pub from_status: ApplicationStatus,
    pub to_status: ApplicationStatus,
    pub recorded_at: chrono::DateTime<chrono::Utc>,
}

/// Generate a UUID v4 using a CSPRNG.
///
/// Uses ChaCha20 seeded from OS entropy so identifiers are unpredictable on
/// all platforms.
pub(crate) fn uuid_v4() -> String {
    use rand::Rng;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    let mut rng = ChaCha20Rng::from_entropy();
    let bytes: [u8; 16] = rng.gen();

    format!(
        "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
        bytes[0], bytes[1], bytes[2], bytes[3],
        bytes[4], bytes[5],
        (bytes[6] & 0x0f) | 0x40, bytes[7],
        (bytes[8] & 0x3f) | 0x80, bytes[9],
        bytes[10], bytes[11], bytes[12], bytes[13], bytes[14], bytes[15]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowed_transitions() {
        assert_eq!(
            ApplicationStatus::Pending
                .apply(ApplicationStatus::Approved)
                .expect("allowed"),
            TransitionOutcome::Applied {
                from: ApplicationStatus::Pending
            }
        );
        assert_eq!(
            ApplicationStatus::Pending
                .apply(ApplicationStatus::Rejected)
                .expect("allowed"),
            TransitionOutcome::Applied {
                from: ApplicationStatus::Pending
            }
        );
    }

    #[test]
    fn test_idempotent_reapplication_is_noop() {
        assert_eq!(
            ApplicationStatus::Approved
                .apply(ApplicationStatus::Approved)
                .expect("no-op"),
            TransitionOutcome::NoOp
        );
        assert_eq!(
            ApplicationStatus::Rejected
                .apply(ApplicationStatus::Rejected)
                .expect("no-op"),
            TransitionOutcome::NoOp
        );
    }

    #[test]
    fn test_disallowed_transitions_fail() {
        for (from, to) in [
            (ApplicationStatus::Approved, ApplicationStatus::Pending),
            (ApplicationStatus::Approved, ApplicationStatus::Rejected),
            (ApplicationStatus::Rejected, ApplicationStatus::Pending),
            (ApplicationStatus::Rejected, ApplicationStatus::Approved),
            (ApplicationStatus::Pending, ApplicationStatus::Pending),
        ] {
            assert!(matches!(
                from.apply(to),
                Err(TransitionError::Invalid { .. })
            ));
        }
    }

    #[test]
    fn test_new_application_defaults() {
        let app = Application::new("Ada Lovelace", "ada@example.edu", 1, Vec::new());
        assert_eq!(app.status, ApplicationStatus::Pending);
        assert_eq!(app.id.len(), 36); // UUID format with dashes
        assert_eq!(app.schema_version, 1);
    }

    #[test]
    fn test_uuid_generation() {
        let id1 = uuid_v4();
        let id2 = uuid_v4();
        assert_ne!(id1, id2);
        assert_eq!(id1.len(), 36);
    }
}
