//! Resolution of key material and cipher support
//!
//! Host secrets come in as optional strings (from the environment, a TOML
//! file, or explicit values) and are resolved once into an immutable
//! [`ProtectionConfig`]. An absent or empty host value selects a fallback
//! literal. The fallback literals are public and give no confidentiality;
//! they exist so that installations without configured secrets keep reading
//! blobs they wrote earlier.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CredboxError, ErrorCategory, ErrorKind, Result};

/// Key used when the host provides none. Well known; provides no protection.
pub const FALLBACK_KEY: &str = "das-ist-kein-geheimer-schluessel";

/// Salt used when the host provides none. Well known; provides no protection.
pub const FALLBACK_SALT: &str = "das-ist-kein-geheimes-salz";

/// Environment variable holding the host's logged-in key
pub const KEY_ENV: &str = "LOGGED_IN_KEY";

/// Environment variable holding the host's logged-in salt
pub const SALT_ENV: &str = "LOGGED_IN_SALT";

/// Whether an AES implementation is available to protect values.
///
/// `Unavailable` puts the service in degraded mode: values pass through
/// unmodified and every result says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CipherSupport {
    #[default]
    Available,
    Unavailable,
}

impl FromStr for CipherSupport {
    type Err = CredboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "aes-256-ctr" => Ok(CipherSupport::Available),
            "none" => Ok(CipherSupport::Unavailable),
            other => Err(CredboxError::with_kind(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("unsupported cipher {:?}; expected \"aes-256-ctr\" or \"none\"", other),
            )),
        }
    }
}

/// Where a resolved secret came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretOrigin {
    /// Configured by the host installation.
    Host,
    /// The built-in fallback literal.
    Fallback,
}

/// Raw, optional host secrets prior to fallback resolution
#[derive(Clone, Default)]
pub struct HostSecrets {
    pub key: Option<String>,
    pub salt: Option<String>,
}

impl HostSecrets {
    pub fn new(key: Option<String>, salt: Option<String>) -> Self {
        Self { key, salt }
    }

    /// Read `LOGGED_IN_KEY` and `LOGGED_IN_SALT` from the process environment
    pub fn from_env() -> Self {
        Self {
            key: std::env::var(KEY_ENV).ok(),
            salt: std::env::var(SALT_ENV).ok(),
        }
    }

    /// Non-empty values set in `other` win over values set in `self`
    ///
    /// An empty override counts as absent, so `LOGGED_IN_KEY=` in the
    /// environment does not knock out a key configured elsewhere.
    pub fn overlay(mut self, mut other: HostSecrets) -> Self {
        Self {
            key: prefer(other.key.take(), self.key.take()),
            salt: prefer(other.salt.take(), self.salt.take()),
        }
    }
}

impl Drop for HostSecrets {
    fn drop(&mut self) {
        self.key.zeroize();
        self.salt.zeroize();
    }
}

fn prefer(over: Option<String>, base: Option<String>) -> Option<String> {
    match over {
        Some(v) if !v.is_empty() => {
            if let Some(mut replaced) = base {
                replaced.zeroize();
            }
            Some(v)
        }
        _ => base,
    }
}

impl fmt::Debug for HostSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostSecrets")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .field("salt", &self.salt.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Immutable key material and cipher mode for one protection service
pub struct ProtectionConfig {
    key: Zeroizing<Vec<u8>>,
    salt: Zeroizing<Vec<u8>>,
    key_origin: SecretOrigin,
    salt_origin: SecretOrigin,
    cipher: CipherSupport,
}

impl ProtectionConfig {
    /// Apply the fallback rule to host secrets
    pub fn resolve(mut host: HostSecrets, cipher: CipherSupport) -> Self {
        let (key, key_origin) = resolve_secret(host.key.take(), FALLBACK_KEY);
        if key_origin == SecretOrigin::Fallback {
            tracing::warn!(
                "no {} configured; using the built-in fallback key, stored credentials are not confidential",
                KEY_ENV
            );
        }

        let (salt, salt_origin) = resolve_secret(host.salt.take(), FALLBACK_SALT);
        if salt_origin == SecretOrigin::Fallback {
            tracing::warn!(
                "no {} configured; using the built-in fallback salt, stored credentials are not confidential",
                SALT_ENV
            );
        }

        if cipher == CipherSupport::Unavailable {
            tracing::warn!("cipher support disabled; credentials will be stored unprotected");
        }

        Self {
            key,
            salt,
            key_origin,
            salt_origin,
            cipher,
        }
    }

    /// Resolve from the process environment with the cipher available
    pub fn from_env() -> Self {
        Self::resolve(HostSecrets::from_env(), CipherSupport::Available)
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    pub fn key_origin(&self) -> SecretOrigin {
        self.key_origin
    }

    pub fn salt_origin(&self) -> SecretOrigin {
        self.salt_origin
    }

    pub fn cipher(&self) -> CipherSupport {
        self.cipher
    }

    /// True if either secret is a built-in fallback literal
    pub fn uses_fallback(&self) -> bool {
        self.key_origin == SecretOrigin::Fallback || self.salt_origin == SecretOrigin::Fallback
    }
}

impl fmt::Debug for ProtectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtectionConfig")
            .field("key", &"[REDACTED]")
            .field("salt", &"[REDACTED]")
            .field("key_origin", &self.key_origin)
            .field("salt_origin", &self.salt_origin)
            .field("cipher", &self.cipher)
            .finish()
    }
}

fn resolve_secret(value: Option<String>, fallback: &str) -> (Zeroizing<Vec<u8>>, SecretOrigin) {
    match value {
        Some(v) if !v.is_empty() => (Zeroizing::new(v.into_bytes()), SecretOrigin::Host),
        _ => (Zeroizing::new(fallback.as_bytes().to_vec()), SecretOrigin::Fallback),
    }
}

/// Raw configuration file as parsed from TOML
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawSettings {
    secrets: Option<RawSecrets>,
    protection: Option<RawProtection>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawSecrets {
    key: Option<String>,
    salt: Option<String>,
}

impl fmt::Debug for RawSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawSecrets { .. }")
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawProtection {
    cipher: Option<String>,
}

/// Validated contents of a configuration file, before fallback resolution
#[derive(Debug, Default)]
pub struct Settings {
    pub secrets: HostSecrets,
    pub cipher: CipherSupport,
}

impl Settings {
    /// Parse settings from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawSettings = toml::from_str(content).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("failed to parse configuration: {}", e),
                e,
            )
        })?;
        Self::from_raw(raw)
    }

    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::Config,
                format!("failed to read configuration {}", path.display()),
                e,
            )
        })?;
        Self::parse(&content)
    }

    fn from_raw(raw: RawSettings) -> Result<Self> {
        let secrets = raw
            .secrets
            .map(|s| HostSecrets::new(s.key, s.salt))
            .unwrap_or_default();
        let cipher = match raw.protection.and_then(|p| p.cipher) {
            Some(name) => name.parse()?,
            None => CipherSupport::Available,
        };
        Ok(Self { secrets, cipher })
    }

    /// Resolve into an immutable protection config
    pub fn into_config(self) -> ProtectionConfig {
        ProtectionConfig::resolve(self.secrets, self.cipher)
    }
}
