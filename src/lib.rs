//! credbox - at-rest protection of stored API credentials using AES-256-CTR

#![forbid(unsafe_code)]

pub mod armor;
pub mod cipher;
pub mod config;
pub mod error;
pub mod input;
pub mod protection;
pub mod store;

pub use config::{CipherSupport, HostSecrets, ProtectionConfig, Settings};
pub use error::{CredboxError, ErrorCategory, ErrorKind, Result};
pub use protection::{Protection, ProtectionService};
pub use store::{CredentialVault, JsonFileStore, MemoryStore, OptionStore};
