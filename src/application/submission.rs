//! Submission service: validate, encode, encrypt and persist applications.
//!
//! Sensitive answers exist in plaintext only inside this service, between
//! form intake and encryption. They are never logged, never stored, and never
//! echoed in error messages.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::application::run_with_timeout;
use crate::config::PortalConfig;
use crate::domain::{Application, EncryptionKey, FieldSchema, SchemaRegistry, SensitiveCiphertext};
use crate::ports::{ApplicationStore, FheEngine};
use crate::PortalError;

/// An incoming application: plaintext identity plus sensitive categorical
/// answers keyed by field name.
#[derive(Clone)]
pub struct SubmissionRequest {
    pub full_name: String,
    pub email: String,
    pub answers: BTreeMap<String, String>,
}

impl SubmissionRequest {
    /// Convenience constructor for `(field, label)` pairs.
    #[must_use]
    pub fn new(
        full_name: impl Into<String>,
        email: impl Into<String>,
        answers: &[(&str, &str)],
    ) -> Self {
        Self {
            full_name: full_name.into(),
            email: email.into(),
            answers: answers
                .iter()
                .map(|(field, label)| ((*field).to_string(), (*label).to_string()))
                .collect(),
        }
    }
}

// The answers are the values this whole system exists to protect; keep them
// out of Debug output.
impl std::fmt::Debug for SubmissionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionRequest")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("answers", &format!("[{} sensitive answers]", self.answers.len()))
            .finish()
    }
}

/// Service handling application intake.
pub struct SubmissionService<F, S>
where
    F: FheEngine + 'static,
    S: ApplicationStore,
{
    fhe: Arc<F>,
    store: Arc<S>,
    schemas: SchemaRegistry,
    config: PortalConfig,
}

impl<F, S> SubmissionService<F, S>
where
    F: FheEngine + 'static,
    S: ApplicationStore,
    S::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new submission service over the published schema registry.
    pub fn new(fhe: Arc<F>, store: Arc<S>, config: PortalConfig) -> Self {
        Self {
            fhe,
            store,
            schemas: SchemaRegistry::published(),
            config,
        }
    }

    /// The schema registry this service encodes against.
    #[must_use]
    pub fn schemas(&self) -> &SchemaRegistry {
        &self.schemas
    }

    /// Accept an application: validate identity, encode and encrypt the
    /// sensitive answers, persist the record with status `pending`.
    ///
    /// # Errors
    /// - `Validation` for empty or malformed identity fields
    /// - `IncompleteSubmission` when an answer for a schema field is missing
    /// - `Schema` for unknown fields or categories
    /// - `Crypto` / `Timeout` when encryption fails after one retry
    pub fn submit(&self, request: SubmissionRequest) -> crate::Result<Application> {
        let full_name = request.full_name.trim();
        if full_name.is_empty() {
            return Err(PortalError::Validation(
                "full name must not be empty".to_string(),
            ));
        }

        let email = request.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(PortalError::Validation(
                "email address is malformed".to_string(),
            ));
        }

        // Answers for fields not on the form are refused rather than silently
        // dropped.
        for field in request.answers.keys() {
            self.schemas.field(field)?;
        }

        // Encode everything before touching key material so schema errors
        // surface first.
        let mut encoded: Vec<(&FieldSchema, u8)> = Vec::with_capacity(self.schemas.fields().len());
        for schema in self.schemas.fields() {
            let label = request.answers.get(&schema.field).ok_or_else(|| {
                PortalError::IncompleteSubmission(format!(
                    "missing answer for field '{}'",
                    schema.field
                ))
            })?;
            encoded.push((schema, schema.encode(label)?));
        }

        let keys = self
            .store
            .load_portal_keys()
            .map_err(|e| PortalError::Storage(e.into()))?
            .ok_or_else(|| {
                crate::domain::CryptoError::Encryption(
                    "portal encryption key not installed".to_string(),
                )
            })?;

        let mut ciphertexts: Vec<SensitiveCiphertext> = Vec::with_capacity(encoded.len());
        for (schema, code) in encoded {
            ciphertexts.push(self.encrypt_one(schema, code, &keys.encryption)?);
        }

        let application = Application::new(
            full_name,
            email,
            self.schemas.version(),
            ciphertexts,
        );

        self.store
            .submit(&application)
            .map_err(|e| PortalError::Storage(e.into()))?;

        tracing::info!(id = %application.id, "Application submitted");
        Ok(application)
    }

    /// Encrypt one encoded answer on a worker thread, bounded by the
    /// operation timeout, retrying once with backoff on failure.
    fn encrypt_one(
        &self,
        schema: &FieldSchema,
        code: u8,
        key: &EncryptionKey,
    ) -> crate::Result<SensitiveCiphertext> {
        let attempt = || {
            let fhe = Arc::clone(&self.fhe);
            let schema = schema.clone();
            let key = key.clone();
            run_with_timeout("encrypt", self.config.op_timeout, move || {
                Ok(fhe.encrypt_code(&schema, code, &key)?)
            })
        };

        match attempt() {
            Ok(ciphertext) => Ok(ciphertext),
            Err(err @ (PortalError::Crypto(_) | PortalError::Timeout(_))) => {
                tracing::warn!(
                    field = %schema.field,
                    error = %err,
                    "Encryption failed, retrying once"
                );
                std::thread::sleep(self.config.retry_backoff);
                attempt()
            }
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::SqliteStore;
    use crate::adapters::tfhe::TfheAdapter;
    use crate::domain::{ApplicationStatus, SchemaError};

    fn service_without_keys() -> SubmissionService<TfheAdapter, SqliteStore> {
        let fhe = Arc::new(TfheAdapter::new());
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));
        SubmissionService::new(fhe, store, PortalConfig::default())
    }

    fn complete_answers() -> Vec<(&'static str, &'static str)> {
        vec![("gender", "female"), ("ethnicity", "asian")]
    }

    #[test]
    fn test_empty_name_rejected() {
        let service = service_without_keys();
        let request = SubmissionRequest::new("   ", "ada@example.edu", &complete_answers());
        assert!(matches!(
            service.submit(request),
            Err(PortalError::Validation(_))
        ));
    }

    #[test]
    fn test_malformed_email_rejected() {
        let service = service_without_keys();
        let request = SubmissionRequest::new("Ada Lovelace", "not-an-email", &complete_answers());
        assert!(matches!(
            service.submit(request),
            Err(PortalError::Validation(_))
        ));
    }

    #[test]
    fn test_missing_answer_rejected() {
        let service = service_without_keys();
        let request =
            SubmissionRequest::new("Ada Lovelace", "ada@example.edu", &[("gender", "female")]);
        let err = service.submit(request).expect_err("must fail");
        assert!(matches!(err, PortalError::IncompleteSubmission(_)));
        assert!(err.to_string().contains("ethnicity"));
    }

    #[test]
    fn test_unknown_category_rejected_without_echoing_label() {
        let service = service_without_keys();
        let request = SubmissionRequest::new(
            "Ada Lovelace",
            "ada@example.edu",
            &[("gender", "quux"), ("ethnicity", "asian")],
        );
        let err = service.submit(request).expect_err("must fail");
        assert!(matches!(
            err,
            PortalError::Schema(SchemaError::UnknownCategory { .. })
        ));
        assert!(!err.to_string().contains("quux"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let service = service_without_keys();
        let mut request =
            SubmissionRequest::new("Ada Lovelace", "ada@example.edu", &complete_answers());
        request
            .answers
            .insert("shoe_size".to_string(), "43".to_string());
        assert!(matches!(
            service.submit(request),
            Err(PortalError::Schema(SchemaError::UnknownField(_)))
        ));
    }

    #[test]
    fn test_submit_without_installed_keys_is_an_encryption_error() {
        let service = service_without_keys();
        let request =
            SubmissionRequest::new("Ada Lovelace", "ada@example.edu", &complete_answers());
        assert!(matches!(
            service.submit(request),
            Err(PortalError::Crypto(_))
        ));
    }

    #[test]
    fn test_submit_stores_ciphertext_only() {
        let fhe = Arc::new(TfheAdapter::new());
        let store = Arc::new(SqliteStore::in_memory().expect("Should create db"));

        let keys = fhe.generate_keys().expect("keys");
        store
            .save_portal_keys(&keys.portal_keys())
            .expect("install keys");

        let service =
            SubmissionService::new(Arc::clone(&fhe), Arc::clone(&store), PortalConfig::default());
        let request =
            SubmissionRequest::new("Ada Lovelace", "ada@example.edu", &complete_answers());

        let application = service.submit(request).expect("Should submit");
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.id.len(), 36);

        let stored = store
            .get(&application.id)
            .expect("Should load")
            .expect("Should exist");

        // Identity fields stay readable.
        assert_eq!(stored.full_name, "Ada Lovelace");
        assert_eq!(stored.email, "ada@example.edu");

        // Sensitive answers exist only as large opaque ciphertexts.
        let gender_code = service.schemas().field("gender").unwrap().encode("female").unwrap();
        let ct = stored.ciphertext("gender").expect("gender ciphertext");
        assert!(ct.size_bytes() > 100);
        assert_ne!(ct.ciphertext, vec![gender_code]);
        assert_eq!(ct.schema_version, service.schemas().version());
        assert!(stored.ciphertext("ethnicity").is_some());
    }
}
