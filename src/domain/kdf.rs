//! Passphrase-based protection for secret material, plus admin password
//! hashing.
//!
//! Two concerns live here, both built on Argon2id:
//! - Sealing the key holder's FHE secret key at rest (Argon2id key
//!   derivation + AES-256-GCM authenticated encryption).
//! - Hashing and verifying admin account passwords (PHC string format).

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, PasswordHasher, Version,
};
use rand::RngCore;
use thiserror::Error;

/// Errors during sealing/opening and password hashing.
#[derive(Debug, Error)]
pub enum KdfError {
    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Sealing failed: {0}")]
    Sealing(String),

    #[error("Opening failed: wrong passphrase or corrupted data")]
    Opening,

    #[error("Invalid sealed key format")]
    InvalidFormat,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),
}

/// Format tag for the serialized sealed-key frame.
const SEALED_MAGIC: &[u8; 4] = b"CGS1";

/// Argon2id parameters used for both key derivation and password hashing
/// (memory KiB, iterations, parallelism).
fn argon2id() -> Result<Argon2<'static>, KdfError> {
    let params = Params::new(47104, 1, 1, Some(32))
        .map_err(|e| KdfError::Derivation(format!("Invalid Argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Sealed secret-key material with all parameters needed to open it.
#[derive(Debug, Clone)]
pub struct SealedKey {
    /// AES-256-GCM ciphertext of the key bytes
    pub ciphertext: Vec<u8>,
    /// Salt used for Argon2id derivation (base64, as produced by `SaltString`)
    pub salt: String,
    /// AES-256-GCM nonce
    pub nonce: [u8; 12],
}

impl SealedKey {
    /// Serialize to a framed byte layout:
    /// `magic || salt_len (u32 LE) || salt || nonce || ciphertext`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let salt_bytes = self.salt.as_bytes();
        let mut out =
            Vec::with_capacity(SEALED_MAGIC.len() + 4 + salt_bytes.len() + 12 + self.ciphertext.len());
        out.extend_from_slice(SEALED_MAGIC);
        out.extend_from_slice(&(salt_bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(salt_bytes);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out
    }

    /// Deserialize from the framed byte layout.
    ///
    /// # Errors
    /// Returns `KdfError::InvalidFormat` on a bad magic tag or truncation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KdfError> {
        let header = SEALED_MAGIC.len() + 4;
        if bytes.len() < header || &bytes[..4] != SEALED_MAGIC {
            return Err(KdfError::InvalidFormat);
        }

        let salt_len =
            u32::from_le_bytes(bytes[4..8].try_into().map_err(|_| KdfError::InvalidFormat)?)
                as usize;
        if bytes.len() < header + salt_len + 12 {
            return Err(KdfError::InvalidFormat);
        }

        let salt = std::str::from_utf8(&bytes[header..header + salt_len])
            .map_err(|_| KdfError::InvalidFormat)?
            .to_string();

        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&bytes[header + salt_len..header + salt_len + 12]);

        Ok(Self {
            ciphertext: bytes[header + salt_len + 12..].to_vec(),
            salt,
            nonce,
        })
    }
}

/// Derive a 256-bit wrapping key from a passphrase.
fn derive_wrapping_key(passphrase: &str, salt: &SaltString) -> Result<[u8; 32], KdfError> {
    let hash = argon2id()?
        .hash_password(passphrase.as_bytes(), salt)
        .map_err(|e| KdfError::Derivation(e.to_string()))?;

    let hash_bytes = hash
        .hash
        .ok_or_else(|| KdfError::Derivation("Hash output missing".to_string()))?;

    let bytes = hash_bytes.as_bytes();
    if bytes.len() < 32 {
        return Err(KdfError::Derivation("Hash too short".to_string()));
    }

    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes[..32]);
    Ok(key)
}

/// Seal secret-key bytes under a passphrase.
///
/// A fresh salt and nonce are drawn per call, so sealing the same key twice
/// yields different ciphertexts.
///
/// # Errors
/// Returns an error if derivation or encryption fails.
pub fn seal_key(plaintext: &[u8], passphrase: &str) -> Result<SealedKey, KdfError> {
    let salt = SaltString::generate(&mut OsRng);
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_wrapping_key(passphrase, &salt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| KdfError::Sealing(e.to_string()))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| KdfError::Sealing(e.to_string()))?;

    Ok(SealedKey {
        ciphertext,
        salt: salt.to_string(),
        nonce: nonce_bytes,
    })
}

/// Open a sealed key with the passphrase it was sealed under.
///
/// # Errors
/// Returns `KdfError::Opening` if the passphrase is wrong or the data was
/// tampered with (AEAD tag mismatch).
pub fn open_key(sealed: &SealedKey, passphrase: &str) -> Result<Vec<u8>, KdfError> {
    let salt = SaltString::from_b64(&sealed.salt).map_err(|_| KdfError::InvalidFormat)?;

    let key = derive_wrapping_key(passphrase, &salt)?;
    let cipher =
        Aes256Gcm::new_from_slice(&key).map_err(|e| KdfError::Derivation(e.to_string()))?;

    cipher
        .decrypt(Nonce::from_slice(&sealed.nonce), sealed.ciphertext.as_ref())
        .map_err(|_| KdfError::Opening)
}

/// Hash an admin password for storage (Argon2id, PHC string format).
///
/// # Errors
/// Returns an error if hashing fails.
pub fn hash_password(password: &str) -> Result<String, KdfError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = argon2id()?
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| KdfError::PasswordHash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a password against a stored PHC hash string.
///
/// Unparseable hashes verify as `false` (fail closed).
#[must_use]
pub fn verify_password(stored_hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_roundtrip() {
        let plaintext = b"serialized_fhe_secret_key_material";
        let passphrase = "correct-horse-battery-staple";

        let sealed = seal_key(plaintext, passphrase).expect("Sealing should succeed");
        let opened = open_key(&sealed, passphrase).expect("Opening should succeed");

        assert_eq!(plaintext.to_vec(), opened);
    }

    #[test]
    fn test_wrong_passphrase_fails() {
        let sealed = seal_key(b"secret", "right").expect("Sealing should succeed");
        assert!(matches!(open_key(&sealed, "wrong"), Err(KdfError::Opening)));
    }

    #[test]
    fn test_framed_serialization_roundtrip() {
        let sealed = seal_key(b"key bytes", "pass").expect("Sealing should succeed");
        let bytes = sealed.to_bytes();

        let restored = SealedKey::from_bytes(&bytes).expect("Deserialization should succeed");
        let opened = open_key(&restored, "pass").expect("Opening should succeed");
        assert_eq!(opened, b"key bytes");
    }

    #[test]
    fn test_bad_magic_rejected() {
        let sealed = seal_key(b"key bytes", "pass").expect("Sealing should succeed");
        let mut bytes = sealed.to_bytes();
        bytes[0] ^= 0xff;
        assert!(matches!(
            SealedKey::from_bytes(&bytes),
            Err(KdfError::InvalidFormat)
        ));
    }

    #[test]
    fn test_fresh_salts_per_seal() {
        let a = seal_key(b"same", "same").expect("seal");
        let b = seal_key(b"same", "same").expect("seal");
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_password_hash_verify() {
        let hash = hash_password("s3cret-enough").expect("hash");
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password(&hash, "s3cret-enough"));
        assert!(!verify_password(&hash, "not-it"));
        assert!(!verify_password("not-a-phc-string", "s3cret-enough"));
    }
}
