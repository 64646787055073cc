//! TFHE adapter: Implementation of FheEngine using tfhe-rs.
//!
//! This module provides FHE operations using Zama's tfhe-rs library.
//!
//! # Key model
//!
//! - `ClientKey` (wrapped as [`SecretKey`]): decrypts; key-holder only.
//! - `PublicKey` (wrapped as `EncryptionKey`): encrypts applicant answers;
//!   distributed to clients.
//! - `ServerKey` (wrapped as `EvaluationKey`): homomorphic computation on
//!   the portal; cannot decrypt.
//!
//! # Thread Safety
//!
//! **IMPORTANT**: `tfhe::set_server_key()` writes to a *thread-local* (TLS)
//! global. Tally operations install the evaluation key for the current thread
//! and clear it with an RAII guard when the computation finishes, so no key
//! leaks into later work scheduled on the same thread.
//!
//! # Tally implementation
//!
//! Each stored answer is an encrypted `FheUint8` code. For every category
//! code the adapter computes `sum_i (ct_i == code)` with a homomorphic
//! equality (yielding an encrypted boolean) widened into an encrypted `u32`
//! accumulator. No individual record is ever decrypted.

use tfhe::prelude::*;
use tfhe::{
    generate_keys, set_server_key, unset_server_key, ClientKey as TfheClientKey, ConfigBuilder,
    FheUint32, FheUint8, PublicKey as TfhePublicKey, ServerKey as TfheServerKey,
};

use crate::domain::{
    CryptoError, EncryptedCount, EncryptionKey, EvaluationKey, FieldSchema, KeySet, SecretKey,
    SensitiveCiphertext,
};
use crate::ports::FheEngine;

/// Clears the thread-local server key when a tally finishes or unwinds.
struct EvalKeyGuard;

impl Drop for EvalKeyGuard {
    fn drop(&mut self) {
        unset_server_key();
    }
}

/// TFHE adapter for FHE operations.
#[derive(Default)]
pub struct TfheAdapter;

impl TfheAdapter {
    /// Create a new TFHE adapter.
    #[must_use]
    pub fn new() -> Self {
        tracing::info!("Initializing TfheAdapter (tfhe-rs)");
        Self
    }

    fn deserialize_client_key(bytes: &[u8]) -> Result<TfheClientKey, CryptoError> {
        bincode::deserialize(bytes).map_err(|e| {
            CryptoError::InvalidKeyFormat(format!("Failed to deserialize secret key: {e}"))
        })
    }

    fn deserialize_public_key(bytes: &[u8]) -> Result<TfhePublicKey, CryptoError> {
        bincode::deserialize(bytes).map_err(|e| {
            CryptoError::InvalidKeyFormat(format!("Failed to deserialize encryption key: {e}"))
        })
    }

    fn deserialize_server_key(bytes: &[u8]) -> Result<TfheServerKey, CryptoError> {
        bincode::deserialize(bytes).map_err(|e| {
            CryptoError::InvalidKeyFormat(format!("Failed to deserialize evaluation key: {e}"))
        })
    }
}

impl FheEngine for TfheAdapter {
    fn generate_keys(&self) -> Result<KeySet, CryptoError> {
        tracing::info!("Generating FHE key set...");

        let config = ConfigBuilder::default().build();
        let (client_key, server_key) = generate_keys(config);
        let public_key = TfhePublicKey::new(&client_key);

        let secret_bytes = bincode::serialize(&client_key).map_err(|e| {
            CryptoError::KeyGeneration(format!("Failed to serialize secret key: {e}"))
        })?;
        let public_bytes = bincode::serialize(&public_key).map_err(|e| {
            CryptoError::KeyGeneration(format!("Failed to serialize encryption key: {e}"))
        })?;
        let server_bytes = bincode::serialize(&server_key).map_err(|e| {
            CryptoError::KeyGeneration(format!("Failed to serialize evaluation key: {e}"))
        })?;

        let keys = KeySet {
            secret: SecretKey::from_bytes(secret_bytes),
            encryption: EncryptionKey::from_bytes(public_bytes),
            evaluation: EvaluationKey::from_bytes(server_bytes),
        };

        tracing::info!(
            "Generated key set - encryption fingerprint: {}, evaluation fingerprint: {}",
            keys.encryption.fingerprint,
            keys.evaluation.fingerprint
        );

        Ok(keys)
    }

    fn encrypt_code(
        &self,
        schema: &FieldSchema,
        code: u8,
        key: &EncryptionKey,
    ) -> Result<SensitiveCiphertext, CryptoError> {
        let public_key = Self::deserialize_public_key(key.as_bytes())?;

        let encrypted: FheUint8 = FheUint8::try_encrypt(code, &public_key)
            .map_err(|e| CryptoError::Encryption(format!("Public-key encryption failed: {e}")))?;

        let ciphertext = bincode::serialize(&encrypted).map_err(|e| {
            CryptoError::Encryption(format!("Failed to serialize ciphertext: {e}"))
        })?;

        tracing::debug!(
            field = %schema.field,
            size_bytes = ciphertext.len(),
            "Encrypted sensitive answer"
        );

        Ok(SensitiveCiphertext::new(
            schema.field.clone(),
            schema.version,
            ciphertext,
            key.fingerprint.clone(),
        ))
    }

    fn tally(
        &self,
        ciphertexts: &[SensitiveCiphertext],
        schema: &FieldSchema,
        key: &EvaluationKey,
    ) -> Result<Vec<EncryptedCount>, CryptoError> {
        tracing::info!(
            field = %schema.field,
            records = ciphertexts.len(),
            "Starting homomorphic tally..."
        );

        // Ciphertexts from different encryption keys cannot be combined.
        if let Some(first) = ciphertexts.first() {
            if let Some(other) = ciphertexts
                .iter()
                .find(|ct| ct.key_fingerprint != first.key_fingerprint)
            {
                return Err(CryptoError::Computation(format!(
                    "Mixed encryption keys in tally input: {} vs {}",
                    first.key_fingerprint, other.key_fingerprint
                )));
            }
        }

        let server_key = Self::deserialize_server_key(key.as_bytes())?;
        set_server_key(server_key);
        let _guard = EvalKeyGuard;

        let mut answers: Vec<FheUint8> = Vec::with_capacity(ciphertexts.len());
        for (i, ct) in ciphertexts.iter().enumerate() {
            let answer: FheUint8 = bincode::deserialize(&ct.ciphertext).map_err(|e| {
                CryptoError::Computation(format!("Failed to deserialize ciphertext {i}: {e}"))
            })?;
            answers.push(answer);
        }

        let mut counts = Vec::with_capacity(schema.categories().len());
        for category in schema.categories() {
            // Encrypted accumulator; stays encrypted through the whole walk.
            let mut acc: FheUint32 = FheUint32::encrypt_trivial(0u32);

            for answer in &answers {
                let hit = answer.eq(category.code);
                acc = acc + FheUint32::cast_from(hit);
            }

            let count_bytes = bincode::serialize(&acc).map_err(|e| {
                CryptoError::Computation(format!("Failed to serialize encrypted count: {e}"))
            })?;
            counts.push(EncryptedCount::new(count_bytes, key.fingerprint.clone()));
        }

        tracing::info!(
            field = %schema.field,
            categories = counts.len(),
            "Completed homomorphic tally"
        );

        Ok(counts)
    }

    fn decrypt_count(&self, count: &EncryptedCount, key: &SecretKey) -> Result<u64, CryptoError> {
        let client_key = Self::deserialize_client_key(key.as_bytes())?;

        let encrypted: FheUint32 = bincode::deserialize(&count.ciphertext).map_err(|e| {
            CryptoError::Decryption(format!("Failed to deserialize encrypted count: {e}"))
        })?;

        let value: u32 = encrypted.decrypt(&client_key);
        Ok(u64::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SchemaRegistry;

    fn gender_schema() -> FieldSchema {
        SchemaRegistry::published()
            .field("gender")
            .expect("gender schema")
            .clone()
    }

    #[test]
    fn test_key_generation() {
        let adapter = TfheAdapter::new();
        let keys = adapter
            .generate_keys()
            .expect("Key generation should succeed");

        // FHE keys are large.
        assert!(keys.secret.as_bytes().len() > 100);
        assert!(keys.encryption.as_bytes().len() > 100);
        assert!(keys.evaluation.as_bytes().len() > 100);
        assert!(!keys.encryption.fingerprint.is_empty());
        assert_ne!(keys.encryption.fingerprint, keys.evaluation.fingerprint);
    }

    #[test]
    fn test_ciphertext_is_opaque() {
        let adapter = TfheAdapter::new();
        let keys = adapter.generate_keys().expect("keys");
        let schema = gender_schema();

        let code = schema.encode("female").expect("code");
        let ct = adapter
            .encrypt_code(&schema, code, &keys.encryption)
            .expect("Encryption should succeed");

        // The stored blob is a large opaque ciphertext, not the code.
        assert!(ct.size_bytes() > 100, "FHE ciphertext should be large");
        assert_ne!(ct.ciphertext, vec![code]);
        assert_eq!(ct.field, "gender");
        assert_eq!(ct.schema_version, schema.version);
        assert_eq!(ct.key_fingerprint, keys.encryption.fingerprint);
    }

    #[test]
    fn test_tally_counts_exactly() {
        let adapter = TfheAdapter::new();
        let keys = adapter.generate_keys().expect("keys");
        let schema = gender_schema();

        // female x2, male x1
        let answers = ["female", "female", "male"];
        let ciphertexts: Vec<_> = answers
            .iter()
            .map(|label| {
                let code = schema.encode(label).expect("code");
                adapter
                    .encrypt_code(&schema, code, &keys.encryption)
                    .expect("encrypt")
            })
            .collect();

        let counts = adapter
            .tally(&ciphertexts, &schema, &keys.evaluation)
            .expect("Tally should succeed");
        assert_eq!(counts.len(), schema.categories().len());

        let decrypted: Vec<u64> = counts
            .iter()
            .map(|c| adapter.decrypt_count(c, &keys.secret).expect("decrypt"))
            .collect();

        // Schema order: male, female, nonbinary, other.
        assert_eq!(decrypted, vec![1, 2, 0, 0]);
    }

    #[test]
    fn test_tally_rejects_mixed_keys() {
        let adapter = TfheAdapter::new();
        let keys = adapter.generate_keys().expect("keys");
        let schema = gender_schema();

        let code = schema.encode("male").expect("code");
        let ct = adapter
            .encrypt_code(&schema, code, &keys.encryption)
            .expect("encrypt");

        let mut foreign = ct.clone();
        foreign.key_fingerprint = "0000000000000000".to_string();

        let err = adapter
            .tally(&[ct, foreign], &schema, &keys.evaluation)
            .expect_err("must fail");
        assert!(matches!(err, CryptoError::Computation(_)));
    }

    #[test]
    fn test_empty_tally_is_all_zero() {
        let adapter = TfheAdapter::new();
        let keys = adapter.generate_keys().expect("keys");
        let schema = gender_schema();

        let counts = adapter
            .tally(&[], &schema, &keys.evaluation)
            .expect("Tally should succeed");
        for count in &counts {
            let v = adapter.decrypt_count(count, &keys.secret).expect("decrypt");
            assert_eq!(v, 0);
        }
    }
}
