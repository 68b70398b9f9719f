//! Textual framing of encrypted credentials
//!
//! A blob is plain text safe to store in any string-oriented option store:
//!
//! ```text
//! base64( iv[16] || base64(ciphertext) )
//! ```
//!
//! Both layers use the standard alphabet with padding. The inner layer is part
//! of the stored format: blobs written by earlier installations went through
//! an OpenSSL string API that base64-encodes its ciphertext output, and they
//! must keep decrypting.

use base64::{Engine, engine::general_purpose::STANDARD};

use crate::cipher::IV_LEN;
use crate::error::{CredboxError, ErrorCategory, ErrorKind, Result};

/// Wrap an IV and raw ciphertext into a blob
pub fn wrap(iv: &[u8; IV_LEN], ciphertext: &[u8]) -> String {
    let inner = STANDARD.encode(ciphertext);
    let mut body = Vec::with_capacity(IV_LEN + inner.len());
    body.extend_from_slice(iv);
    body.extend_from_slice(inner.as_bytes());
    STANDARD.encode(body)
}

/// Unwrap a blob into its IV and raw ciphertext
pub fn unwrap(blob: &str) -> Result<([u8; IV_LEN], Vec<u8>)> {
    let body = STANDARD.decode(blob).map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::ArmorDecode,
            format!("base64 decoding failed: {}", e),
            e,
        )
    })?;

    if body.len() < IV_LEN {
        return Err(CredboxError::with_kind(
            ErrorCategory::User,
            ErrorKind::TruncatedBlob,
            "blob likely truncated while reading initialization vector",
        ));
    }
    let (iv_bytes, inner) = body.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(iv_bytes);

    let ciphertext = STANDARD.decode(inner).map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::ArmorDecode,
            format!("base64 decoding of ciphertext failed: {}", e),
            e,
        )
    })?;

    Ok((iv, ciphertext))
}
