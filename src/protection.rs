//! Credential protection service
//!
//! Encrypts credential strings for storage and decrypts them on read:
//!
//! ```text
//! blob      = armor(iv, AES-256-CTR(key, iv, plaintext || salt))
//! plaintext = strip_salt(AES-256-CTR(key, iv, ciphertext))
//! ```
//!
//! The salt is appended before encryption and checked after decryption. It is
//! the only integrity check: a wrong key, a wrong salt, a damaged IV, or a
//! damaged salt suffix produces a candidate that does not end with the salt,
//! and decryption fails instead of returning garbage.
//!
//! The check is not a MAC. CTR is malleable, so a bit flipped in the
//! plaintext region of the ciphertext flips the same bit of the decrypted
//! credential and still passes. The stored format offers nothing stronger.

use zeroize::Zeroizing;

use crate::armor;
use crate::cipher::{self, IV_LEN};
use crate::config::{CipherSupport, ProtectionConfig};
use crate::error::{CredboxError, ErrorCategory, ErrorKind, Result};

/// The outcome of a protection operation, tagged with whether the cipher ran.
///
/// `Passthrough` means the service is in degraded mode and the value was
/// returned unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Protection<T> {
    Protected(T),
    Passthrough(T),
}

impl<T> Protection<T> {
    pub fn is_protected(&self) -> bool {
        matches!(self, Protection::Protected(_))
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, Protection::Passthrough(_))
    }

    pub fn as_inner(&self) -> &T {
        match self {
            Protection::Protected(v) | Protection::Passthrough(v) => v,
        }
    }

    /// Discard the tag and take the value
    pub fn into_inner(self) -> T {
        match self {
            Protection::Protected(v) | Protection::Passthrough(v) => v,
        }
    }
}

/// Encrypts and decrypts credentials under a fixed key and salt
#[derive(Debug)]
pub struct ProtectionService {
    config: ProtectionConfig,
}

impl ProtectionService {
    pub fn new(config: ProtectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProtectionConfig {
        &self.config
    }

    /// True when values pass through unprotected
    pub fn is_degraded(&self) -> bool {
        self.config.cipher() == CipherSupport::Unavailable
    }

    /// True when the key or salt is a well-known fallback literal
    pub fn uses_fallback_secrets(&self) -> bool {
        self.config.uses_fallback()
    }

    /// Encrypt a credential under a fresh random IV
    ///
    /// Two calls with the same plaintext return different blobs.
    pub fn encrypt(&self, plaintext: &str) -> Result<Protection<String>> {
        if self.is_degraded() {
            return Ok(Protection::Passthrough(plaintext.to_string()));
        }
        let iv = cipher::random_iv();
        self.seal(plaintext, &iv).map(Protection::Protected)
    }

    /// Encrypt a credential using the provided IV
    ///
    /// This function is ONLY for testing purposes to generate deterministic output.
    /// NEVER use this in production - always use `encrypt()` which draws a random IV.
    /// Ignores degraded mode.
    pub fn encrypt_with_iv(&self, plaintext: &str, iv: &[u8; IV_LEN]) -> Result<String> {
        self.seal(plaintext, iv)
    }

    /// Decrypt a blob produced by [`ProtectionService::encrypt`]
    ///
    /// Every failure is an `Err`; an empty plaintext is a legitimate success.
    pub fn decrypt(&self, blob: &str) -> Result<Protection<String>> {
        if self.is_degraded() {
            return Ok(Protection::Passthrough(blob.to_string()));
        }

        let (iv, ciphertext) = armor::unwrap(blob)?;
        let candidate = Zeroizing::new(cipher::apply_keystream(
            self.config.key(),
            &iv,
            &ciphertext,
        )?);

        let salt = self.config.salt();
        if !candidate.ends_with(salt) {
            tracing::debug!(len = ciphertext.len(), "blob failed the salt check");
            return Err(CredboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::IntegrityMismatch,
                "integrity check failed: wrong key or salt, or corrupted blob",
            ));
        }
        let body = &candidate[..candidate.len() - salt.len()];

        let plaintext = std::str::from_utf8(body).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::InvalidUtf8,
                "decrypted credential is not valid UTF-8",
                e,
            )
        })?;

        Ok(Protection::Protected(plaintext.to_string()))
    }

    fn seal(&self, plaintext: &str, iv: &[u8; IV_LEN]) -> Result<String> {
        let salt = self.config.salt();
        let mut message = Zeroizing::new(Vec::with_capacity(plaintext.len() + salt.len()));
        message.extend_from_slice(plaintext.as_bytes());
        message.extend_from_slice(salt);

        let ciphertext = cipher::apply_keystream(self.config.key(), iv, &message)?;
        Ok(armor::wrap(iv, &ciphertext))
    }
}
