//! Aggregation service: homomorphic cohort statistics.
//!
//! Per-category counts are computed over ciphertexts with the evaluation
//! key; no individual record is decrypted, and the resulting counts are
//! themselves ciphertexts. Decryption happens off-portal, with the secret
//! key held by the key-holding party (see the `keyholder` binary).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::SessionGate;
use crate::domain::{Action, EncryptedCount, SchemaRegistry, SecretKey};
use crate::ports::{ApplicationStore, CredentialStore, FheEngine};
use crate::PortalError;

/// Encrypted count for one category of the aggregated field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryCount {
    pub label: String,
    pub count: EncryptedCount,
}

/// Encrypted per-category counts for one sensitive field.
///
/// Serializable so it can travel to the key holder as a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateReport {
    pub field: String,
    pub schema_version: u32,
    /// Number of ciphertexts aggregated (not sensitive: the cohort size is
    /// the number of applications, which the dashboard already shows).
    pub record_count: usize,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub counts: Vec<CategoryCount>,
}

/// Decrypted per-category totals, produced only by the key holder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecryptedReport {
    pub field: String,
    pub schema_version: u32,
    pub counts: BTreeMap<String, u64>,
}

/// Service computing encrypted aggregate reports.
pub struct AggregationService<F, S, C>
where
    F: FheEngine,
    S: ApplicationStore,
    C: CredentialStore,
{
    fhe: Arc<F>,
    store: Arc<S>,
    gate: Arc<SessionGate<C>>,
    schemas: SchemaRegistry,
}

impl<F, S, C> AggregationService<F, S, C>
where
    F: FheEngine,
    S: ApplicationStore,
    C: CredentialStore,
    S::Error: Into<crate::adapters::StorageError>,
    C::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new aggregation service over the published schema registry.
    pub fn new(fhe: Arc<F>, store: Arc<S>, gate: Arc<SessionGate<C>>) -> Self {
        Self {
            fhe,
            store,
            gate,
            schemas: SchemaRegistry::published(),
        }
    }

    /// Compute encrypted per-category counts for one sensitive field.
    ///
    /// Requires a `Registrar` session. The snapshot of ciphertexts is taken
    /// in one statement, so concurrent submissions are either fully included
    /// or not at all.
    ///
    /// # Errors
    /// - `Auth` for missing/expired/under-privileged sessions
    /// - `Schema` for a field not on the form
    /// - `Aggregation` when ciphertexts carry mixed schema versions or no
    ///   portal keys are installed
    pub fn aggregate(&self, token: &str, field_name: &str) -> crate::Result<AggregateReport> {
        let session = self.gate.authorize(token, Action::AggregateReport)?;
        let schema = self.schemas.field(field_name)?;

        let ciphertexts = self
            .store
            .field_ciphertexts(field_name)
            .map_err(|e| PortalError::Storage(e.into()))?;

        // Ciphertexts encoded under a different published table are not
        // comparable; refuse rather than producing a silently wrong report.
        if let Some(ct) = ciphertexts
            .iter()
            .find(|ct| ct.schema_version != schema.version)
        {
            return Err(PortalError::Aggregation(format!(
                "mixed schema versions for field '{}': expected {}, found {}",
                field_name, schema.version, ct.schema_version
            )));
        }

        let keys = self
            .store
            .load_portal_keys()
            .map_err(|e| PortalError::Storage(e.into()))?
            .ok_or_else(|| {
                PortalError::Aggregation("portal evaluation key not installed".to_string())
            })?;

        let counts = self.fhe.tally(&ciphertexts, schema, &keys.evaluation)?;

        let report = AggregateReport {
            field: schema.field.clone(),
            schema_version: schema.version,
            record_count: ciphertexts.len(),
            generated_at: chrono::Utc::now(),
            counts: schema
                .categories()
                .iter()
                .zip(counts)
                .map(|(category, count)| CategoryCount {
                    label: category.label.clone(),
                    count,
                })
                .collect(),
        };

        tracing::info!(
            field = %report.field,
            records = report.record_count,
            role = %session.role,
            "Generated encrypted aggregate report"
        );

        Ok(report)
    }
}

/// Decrypt an aggregate report with the key holder's secret key.
///
/// This is the only decryption path in the crate, and it reveals totals
/// only, never a per-record value. It is invoked by the `keyholder` binary,
/// off the portal host.
///
/// # Errors
/// Returns `Crypto` errors if a count cannot be decrypted.
pub fn decrypt_report<F: FheEngine>(
    fhe: &F,
    report: &AggregateReport,
    key: &SecretKey,
) -> crate::Result<DecryptedReport> {
    let mut counts = BTreeMap::new();
    for category in &report.counts {
        let total = fhe.decrypt_count(&category.count, key)?;
        counts.insert(category.label.clone(), total);
    }

    Ok(DecryptedReport {
        field: report.field.clone(),
        schema_version: report.schema_version,
        counts,
    })
}
