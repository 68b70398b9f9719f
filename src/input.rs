//! Reading credential values to protect

use crate::error::{CredboxError, ErrorCategory, ErrorKind, Result};
use std::io::{self, IsTerminal, Read, Write};
use zeroize::Zeroizing;

/// Trait for reading a secret value from various sources
pub trait SecretReader {
    /// Read one secret as UTF-8 text
    ///
    /// Returns the secret wrapped in `Zeroizing` so it is wiped from memory
    /// when dropped.
    fn read_secret(&mut self) -> Result<Zeroizing<String>>;
}

/// Returns a fixed secret (for testing)
pub struct ConstantSecretReader {
    secret: Zeroizing<String>,
}

impl ConstantSecretReader {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Zeroizing::new(secret.into()),
        }
    }
}

impl SecretReader for ConstantSecretReader {
    fn read_secret(&mut self) -> Result<Zeroizing<String>> {
        Ok(self.secret.clone())
    }
}

/// Reads a secret from any io::Read source
///
/// One trailing line ending (`\n` or `\r\n`) is removed so that
/// `echo token | credbox encrypt --secret-stdin` protects `token`.
pub struct ReaderSecretReader {
    reader: Box<dyn Read>,
}

impl ReaderSecretReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl SecretReader for ReaderSecretReader {
    fn read_secret(&mut self) -> Result<Zeroizing<String>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("error reading secret: {}", e),
                e,
            )
        })?;

        if data.ends_with(b"\n") {
            data.pop();
            if data.ends_with(b"\r") {
                data.pop();
            }
        }

        let text = std::str::from_utf8(&data).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::SecretUnavailable,
                "secret is not valid UTF-8",
                e,
            )
        })?;
        Ok(Zeroizing::new(text.to_string()))
    }
}

/// Reads a secret from the terminal with no echo
pub struct TerminalSecretReader;

impl TerminalSecretReader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TerminalSecretReader {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretReader for TerminalSecretReader {
    fn read_secret(&mut self) -> Result<Zeroizing<String>> {
        if !io::stdin().is_terminal() {
            return Err(CredboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::SecretUnavailable,
                "cannot read secret from terminal - stdin is not a terminal",
            ));
        }

        io::stderr().write_all(b"Secret (credbox): ").map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })?;
        io::stderr().flush().map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // Note: rpassword returns a plain String, wrapped immediately
        let secret = rpassword::read_password().map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::SecretUnavailable,
                format!("failure reading secret: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(secret))
    }
}
