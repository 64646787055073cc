//! Cryptographic types for FHE operations.
//!
//! Wrappers around tfhe-rs key and ciphertext material with additional safety
//! guarantees.
//!
//! # Memory Security
//!
//! The secret (decryption) key implements `Zeroize` and `ZeroizeOnDrop` so
//! key material is erased when no longer needed, and its `Debug`
//! implementation never exposes key bytes. The encryption and evaluation keys
//! are public material; they still redact their (large) byte payloads from
//! `Debug` output.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Error type for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("Encryption failed: {0}")]
    Encryption(String),

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("FHE computation failed: {0}")]
    Computation(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),
}

/// Secret decryption key, held only by the key-holding party.
///
/// This key MUST never reach the portal process: no store or service
/// operation accepts it. It decrypts aggregate counts, nothing else.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    /// Serialized key bytes (tfhe-rs ClientKey)
    pub(crate) inner: Vec<u8>,

    /// Key fingerprint for identification (NOT secret)
    #[zeroize(skip)]
    pub fingerprint: String,
}

impl SecretKey {
    /// Wrap raw serialized key bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let fingerprint = compute_fingerprint(&bytes);
        Self {
            inner: bytes,
            fingerprint,
        }
    }

    /// Get the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

// Intentionally no derived Debug: key bytes must never leak via formatting.
impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("fingerprint", &self.fingerprint)
            .field("size_bytes", &self.inner.len())
            .finish()
    }
}

/// Public encryption key distributed to applicants' clients.
///
/// Anyone may encrypt under this key; it cannot decrypt.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptionKey {
    pub(crate) inner: Vec<u8>,

    /// Key fingerprint for identification
    pub fingerprint: String,
}

impl EncryptionKey {
    /// Wrap raw serialized key bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let fingerprint = compute_fingerprint(&bytes);
        Self {
            inner: bytes,
            fingerprint,
        }
    }

    /// Get the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionKey")
            .field("fingerprint", &self.fingerprint)
            .field("size_bytes", &self.inner.len())
            .finish()
    }
}

/// Evaluation key for homomorphic computation.
///
/// Allows the portal to compute over ciphertexts but CANNOT decrypt.
#[derive(Clone, Serialize, Deserialize)]
pub struct EvaluationKey {
    pub(crate) inner: Vec<u8>,

    /// Key fingerprint for identification
    pub fingerprint: String,
}

impl EvaluationKey {
    /// Wrap raw serialized key bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        let fingerprint = compute_fingerprint(&bytes);
        Self {
            inner: bytes,
            fingerprint,
        }
    }

    /// Get the raw key bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner
    }
}

impl std::fmt::Debug for EvaluationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationKey")
            .field("fingerprint", &self.fingerprint)
            .field("size_bytes", &self.inner.len())
            .finish()
    }
}

/// Full key set produced by key generation.
///
/// Only the key holder ever sees all three parts; the portal receives the
/// public material as a [`PortalKeys`].
#[derive(Debug, Clone)]
pub struct KeySet {
    pub secret: SecretKey,
    pub encryption: EncryptionKey,
    pub evaluation: EvaluationKey,
}

impl KeySet {
    /// The public half of the key set, safe to hand to the portal.
    #[must_use]
    pub fn portal_keys(&self) -> PortalKeys {
        PortalKeys {
            encryption: self.encryption.clone(),
            evaluation: self.evaluation.clone(),
        }
    }
}

/// Public key material installed on the portal side.
#[derive(Debug, Clone)]
pub struct PortalKeys {
    pub encryption: EncryptionKey,
    pub evaluation: EvaluationKey,
}

/// Ciphertext of one encoded sensitive answer.
///
/// Opaque to every component except the FHE engine; tagged with the schema
/// version the answer was encoded under so aggregation can refuse mixed
/// cohorts.
#[derive(Clone, Serialize, Deserialize)]
pub struct SensitiveCiphertext {
    /// Sensitive field this ciphertext answers
    pub field: String,

    /// Schema version of the encoding
    pub schema_version: u32,

    /// Serialized encrypted code
    pub ciphertext: Vec<u8>,

    /// Fingerprint of the encryption key used
    pub key_fingerprint: String,
}

impl SensitiveCiphertext {
    /// Create a new sensitive-field ciphertext.
    #[must_use]
    pub fn new(
        field: impl Into<String>,
        schema_version: u32,
        ciphertext: Vec<u8>,
        key_fingerprint: String,
    ) -> Self {
        Self {
            field: field.into(),
            schema_version,
            ciphertext,
            key_fingerprint,
        }
    }

    /// Size of the ciphertext in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.ciphertext.len()
    }
}

impl std::fmt::Debug for SensitiveCiphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensitiveCiphertext")
            .field("field", &self.field)
            .field("schema_version", &self.schema_version)
            .field("size_bytes", &self.ciphertext.len())
            .field("key_fingerprint", &self.key_fingerprint)
            .finish()
    }
}

/// Encrypted per-category count produced by homomorphic aggregation.
#[derive(Clone, Serialize, Deserialize)]
pub struct EncryptedCount {
    /// Serialized encrypted counter
    pub ciphertext: Vec<u8>,

    /// Fingerprint of the evaluation key used for the tally
    pub key_fingerprint: String,
}

impl EncryptedCount {
    /// Create a new encrypted count.
    #[must_use]
    pub fn new(ciphertext: Vec<u8>, key_fingerprint: String) -> Self {
        Self {
            ciphertext,
            key_fingerprint,
        }
    }
}

impl std::fmt::Debug for EncryptedCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCount")
            .field("size_bytes", &self.ciphertext.len())
            .field("key_fingerprint", &self.key_fingerprint)
            .finish()
    }
}

/// Compute a fingerprint for key identification using SHA-256.
///
/// The fingerprint is a hash prefix, never raw key material.
fn compute_fingerprint(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();

    result[..8]
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_key_debug_no_leak() {
        let key = SecretKey::from_bytes(vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
        let debug_output = format!("{key:?}");

        assert!(!debug_output.contains("1, 2, 3"));
        assert!(debug_output.contains("fingerprint"));
    }

    #[test]
    fn test_fingerprint_is_a_hash_prefix() {
        let fp = compute_fingerprint(&[0xde, 0xad, 0xbe, 0xef]);
        // A raw-bytes fingerprint would read "deadbeef".
        assert_ne!(fp, "deadbeef");
        assert_eq!(fp.len(), 16); // 8 bytes = 16 hex chars
    }

    #[test]
    fn test_same_bytes_same_fingerprint() {
        let fp1 = compute_fingerprint(&[1, 2, 3, 4]);
        let fp2 = compute_fingerprint(&[1, 2, 3, 4]);
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn test_ciphertext_debug_hides_payload() {
        let ct = SensitiveCiphertext::new("gender", 1, vec![0u8; 2048], "abcd".to_string());
        let debug_output = format!("{ct:?}");
        assert!(debug_output.contains("2048"));
        assert!(!debug_output.contains("[0, 0"));
    }

    #[test]
    fn test_portal_keys_carry_no_secret() {
        let set = KeySet {
            secret: SecretKey::from_bytes(vec![9; 8]),
            encryption: EncryptionKey::from_bytes(vec![1; 8]),
            evaluation: EvaluationKey::from_bytes(vec![2; 8]),
        };
        let portal = set.portal_keys();
        assert_eq!(portal.encryption.fingerprint, set.encryption.fingerprint);
        assert_eq!(portal.evaluation.fingerprint, set.evaluation.fingerprint);
    }
}
