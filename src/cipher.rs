//! AES-256-CTR keystream application
//!
//! The cipher is used exactly the way OpenSSL's `aes-256-ctr` treats a string
//! key and a 16-byte IV:
//! - the key is NUL-padded to 32 bytes when shorter and truncated when longer
//! - the IV is the full initial counter block, incremented as one 128-bit
//!   big-endian integer
//!
//! CTR is a stream mode: encryption and decryption are the same operation and
//! the output is exactly as long as the input. There is no padding and no
//! authentication tag; integrity is checked a layer up.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroizing;

use crate::error::{CredboxError, ErrorCategory, ErrorKind, Result};

type Aes256Ctr = ctr::Ctr128BE<Aes256>;

/// Length of the AES-256 key in bytes
pub const KEY_LEN: usize = 32;

/// Length of the CTR initialization vector in bytes
pub const IV_LEN: usize = 16;

/// Normalise arbitrary key material to an AES-256 key
fn normalize_key(key: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut normalized = Zeroizing::new([0u8; KEY_LEN]);
    let len = key.len().min(KEY_LEN);
    normalized[..len].copy_from_slice(&key[..len]);
    normalized
}

/// Draw a fresh IV from the operating system's CSPRNG
pub fn random_iv() -> [u8; IV_LEN] {
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut iv);
    iv
}

/// XOR `data` with the AES-256-CTR keystream for `key` and `iv`
pub fn apply_keystream(key: &[u8], iv: &[u8; IV_LEN], data: &[u8]) -> Result<Vec<u8>> {
    let key = normalize_key(key);

    let mut cipher = Aes256Ctr::new_from_slices(&key[..], iv).map_err(|e| {
        CredboxError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::CipherFailure,
            format!("cipher rejected key material: {}", e),
        )
    })?;

    let mut output = data.to_vec();
    cipher.try_apply_keystream(&mut output).map_err(|e| {
        CredboxError::with_kind(
            ErrorCategory::Internal,
            ErrorKind::CipherFailure,
            format!("keystream exhausted: {}", e),
        )
    })?;

    Ok(output)
}
