//! Option store boundary and the credential vault built on it
//!
//! The protection service never persists anything. Persistence belongs to a
//! key/value option store; [`CredentialVault`] pairs one with a
//! [`ProtectionService`] so that only blobs ever reach the store.

use crate::error::{CredboxError, ErrorCategory, ErrorKind, Result};
use crate::protection::{Protection, ProtectionService};
use fs4::fs_std::FileExt;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A key/value store of named string options
pub trait OptionStore {
    fn get(&self, name: &str) -> Result<Option<String>>;

    fn set(&mut self, name: &str, value: &str) -> Result<()>;

    /// Remove an option, returning whether it existed
    fn delete(&mut self, name: &str) -> Result<bool>;
}

/// In-memory option store
#[derive(Debug, Default)]
pub struct MemoryStore {
    options: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OptionStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.options.get(name).cloned())
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        self.options.insert(name.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&mut self, name: &str) -> Result<bool> {
        Ok(self.options.remove(name).is_some())
    }
}

/// Option store kept as a JSON object in a single file
///
/// Every write replaces the file atomically (tempfile + fsync + rename), so
/// readers see either the old or the new contents, never a partial file. The
/// file is created with mode 0o600 on Unix systems. A missing file reads as
/// an empty store.
///
/// `set` and `delete` are read-modify-write cycles. They hold an exclusive
/// lock on a sidecar `<store>.lock` file for the whole cycle, so concurrent
/// writers, including other processes, do not lose each other's updates.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(read_error(&self.path, e)),
        };
        serde_json::from_slice(&bytes).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::StoreCorrupt,
                format!(
                    "option store {} is not a JSON object of strings",
                    self.path.display()
                ),
                e,
            )
        })
    }

    /// Take the writer lock; it is released when the returned file is dropped
    fn lock(&self) -> Result<fs::File> {
        let mut lock_path = self.path.clone().into_os_string();
        lock_path.push(".lock");
        let lock_path = PathBuf::from(lock_path);

        let file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| {
                CredboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    format!("failed to open lock file {}", lock_path.display()),
                    e,
                )
            })?;
        FileExt::lock_exclusive(&file).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to lock {}", lock_path.display()),
                e,
            )
        })?;
        Ok(file)
    }

    fn save(&self, options: &BTreeMap<String, String>) -> Result<()> {
        let contents = serde_json::to_vec_pretty(options).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to serialize option store",
                e,
            )
        })?;
        write_atomic(&self.path, &contents)
            .map_err(|e| e.with_context(format!("failed to write to {}", self.path.display())))?;
        tracing::debug!(path = %self.path.display(), count = options.len(), "option store saved");
        Ok(())
    }
}

impl OptionStore for JsonFileStore {
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self.load()?.remove(name))
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        let _lock = self.lock()?;
        let mut options = self.load()?;
        options.insert(name.to_string(), value.to_string());
        self.save(&options)
    }

    fn delete(&mut self, name: &str) -> Result<bool> {
        let _lock = self.lock()?;
        let mut options = self.load()?;
        if options.remove(name).is_none() {
            return Ok(false);
        }
        self.save(&options)?;
        Ok(true)
    }
}

/// Stores credentials encrypted and hands them back decrypted
pub struct CredentialVault<S: OptionStore> {
    store: S,
    protection: ProtectionService,
}

impl<S: OptionStore> CredentialVault<S> {
    pub fn new(store: S, protection: ProtectionService) -> Self {
        Self { store, protection }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn protection(&self) -> &ProtectionService {
        &self.protection
    }

    /// Encrypt `secret` and store the blob under `name`
    pub fn put(&mut self, name: &str, secret: &str) -> Result<Protection<()>> {
        let blob = self
            .protection
            .encrypt(secret)
            .map_err(|e| e.with_context(format!("failed to encrypt option {}", name)))?;
        self.store.set(name, blob.as_inner())?;
        Ok(match blob {
            Protection::Protected(_) => Protection::Protected(()),
            Protection::Passthrough(_) => {
                tracing::warn!(option = name, "credential stored without protection");
                Protection::Passthrough(())
            }
        })
    }

    /// Load and decrypt the credential stored under `name`
    ///
    /// A stored value that fails to decrypt is an error: the credential is
    /// unusable and the operator has to re-authenticate.
    pub fn get(&self, name: &str) -> Result<Option<Protection<String>>> {
        let Some(blob) = self.store.get(name)? else {
            return Ok(None);
        };
        let plaintext = self
            .protection
            .decrypt(&blob)
            .map_err(|e| e.with_context(format!("failed to decrypt option {}", name)))?;
        Ok(Some(plaintext))
    }

    /// Remove the credential stored under `name`
    pub fn remove(&mut self, name: &str) -> Result<bool> {
        self.store.delete(name)
    }
}

/// Replace `path` atomically with `contents`, mode 0o600 on Unix
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to create tempfile",
            e,
        )
    })?;

    temp_file.write_all(contents).map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = temp_file
            .as_file()
            .metadata()
            .map_err(|e| {
                CredboxError::with_kind_and_source(
                    ErrorCategory::Internal,
                    ErrorKind::Io,
                    "failed to get tempfile metadata",
                    e,
                )
            })?
            .permissions();
        perms.set_mode(0o600);
        temp_file.as_file().set_permissions(perms).map_err(|e| {
            CredboxError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                "failed to set tempfile permissions",
                e,
            )
        })?;
    }

    temp_file.persist(path).map_err(|e| {
        CredboxError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file {}", path.display()),
            e,
        )
    })?;
    Ok(())
}

fn read_error(path: &Path, err: io::Error) -> CredboxError {
    CredboxError::with_kind_and_source(
        ErrorCategory::Internal,
        ErrorKind::Io,
        format!("failed to read from {}", path.display()),
        err,
    )
}
