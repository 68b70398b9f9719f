use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    /// Any failure that cannot be confidently attributed to any other error
    /// category in this enum.
    ///
    /// Use of Internal is never a guarantee that the error is not, for
    /// example, caused by a bad blob - merely that the code cannot tell.
    Internal,

    /// The caller provided invalid input (a foreign or damaged blob, a bad
    /// configuration file) or asked for something impossible.
    User,
}

/// Fine-grained condition flags for consumers that want to branch on error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Base64 decoding of the blob (outer or inner layer) failed.
    ArmorDecode,
    /// The decoded blob is too short to hold an initialization vector.
    TruncatedBlob,
    /// The decrypted candidate does not end with the salt: wrong key or salt,
    /// tampering, or corruption.
    IntegrityMismatch,
    /// The recovered plaintext is not valid UTF-8.
    InvalidUtf8,
    /// The AES-256-CTR primitive rejected its inputs.
    CipherFailure,
    /// A configuration file could not be read or is invalid.
    Config,
    /// The option store file exists but does not hold a JSON object of strings.
    StoreCorrupt,
    /// A secret could not be obtained from the configured reader.
    SecretUnavailable,
    /// Interaction with the filesystem, stdin/stdout, or other I/O failed.
    Io,
}

#[derive(Debug, Error)]
#[error("{msg}")]
pub struct CredboxError {
    /// Broad error category, always provided.
    pub category: ErrorCategory,
    /// Optional specific condition tag. Any code consuming errors MUST
    /// handle the absence of a defined kind.
    pub kind: Option<ErrorKind>,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    msg: String,
}

impl CredboxError {
    /// Creates a new error with a required category and display message.
    pub fn new(category: ErrorCategory, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: None,
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that also tags the failure with a kind.
    pub fn with_kind(category: ErrorCategory, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: None,
            msg: msg.into(),
        }
    }

    /// Creates a new error that carries both a kind tag and the originating source error.
    pub fn with_kind_and_source(
        category: ErrorCategory,
        kind: ErrorKind,
        msg: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            category,
            kind: Some(kind),
            source: Some(Box::new(source)),
            msg: msg.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the preserved source error if present.
    pub fn source_error(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    /// Wraps the current error with a higher-level message while preserving the original as source.
    ///
    /// Category and kind carry over so callers can still branch on them.
    pub fn with_context(self, msg: impl Into<String>) -> Self {
        let category = self.category;
        let kind = self.kind;
        Self {
            category,
            kind,
            source: Some(Box::new(self)),
            msg: msg.into(),
        }
    }

    /// True when the blob could not be turned back into a credential, for any
    /// reason attributable to the blob itself. Callers typically respond by
    /// asking the operator to re-authenticate.
    pub fn is_unusable_credential(&self) -> bool {
        matches!(
            self.kind,
            Some(
                ErrorKind::ArmorDecode
                    | ErrorKind::TruncatedBlob
                    | ErrorKind::IntegrityMismatch
                    | ErrorKind::InvalidUtf8
            )
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, CredboxError>;
