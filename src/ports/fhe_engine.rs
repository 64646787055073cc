//! FHE Engine port: Trait for Fully Homomorphic Encryption operations.
//!
//! This trait abstracts the FHE library (tfhe-rs) from the application logic.

use crate::domain::{
    CryptoError, EncryptedCount, EncryptionKey, EvaluationKey, FieldSchema, KeySet, SecretKey,
    SensitiveCiphertext,
};

/// Trait for FHE operations.
///
/// Implementations provide:
/// - Key generation with a CSPRNG
/// - Public-key encryption of encoded categorical answers
/// - Homomorphic per-category tallying (blind counting)
/// - Decryption of aggregate counts (key-holder side only)
pub trait FheEngine: Send + Sync {
    /// Generate a new key set for FHE operations.
    ///
    /// # Errors
    /// Returns `CryptoError::KeyGeneration` if key generation fails.
    fn generate_keys(&self) -> Result<KeySet, CryptoError>;

    /// Encrypt one encoded sensitive answer under the public encryption key.
    ///
    /// The resulting ciphertext is opaque to every downstream component and
    /// carries the schema version and key fingerprint it was produced with.
    ///
    /// # Errors
    /// Returns `CryptoError::Encryption` on a malformed key or a code the
    /// underlying plaintext domain cannot represent.
    fn encrypt_code(
        &self,
        schema: &FieldSchema,
        code: u8,
        key: &EncryptionKey,
    ) -> Result<SensitiveCiphertext, CryptoError>;

    /// Homomorphically count how many ciphertexts encode each category of
    /// `schema`, without decrypting any individual record.
    ///
    /// Returns one encrypted count per category, in schema order.
    ///
    /// # Errors
    /// Returns `CryptoError::Computation` if a ciphertext cannot be
    /// deserialized or the ciphertexts were produced under different keys.
    fn tally(
        &self,
        ciphertexts: &[SensitiveCiphertext],
        schema: &FieldSchema,
        key: &EvaluationKey,
    ) -> Result<Vec<EncryptedCount>, CryptoError>;

    /// Decrypt one aggregate count.
    ///
    /// Requires the secret key, which the portal process never holds; this is
    /// called by the key-holder tooling only.
    ///
    /// # Errors
    /// Returns `CryptoError::Decryption` if decryption fails.
    fn decrypt_count(&self, count: &EncryptedCount, key: &SecretKey) -> Result<u64, CryptoError>;
}
