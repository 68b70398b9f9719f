//! credbox CLI - protect credentials for at-rest storage
//!
//! Command-line interface for encrypting credentials into storage blobs,
//! decrypting them, and managing a JSON option store of protected values.

use clap::{ArgAction, Parser, Subcommand};
use std::error::Error as _;
use std::path::PathBuf;
use std::process;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use credbox::input::{ReaderSecretReader, SecretReader, TerminalSecretReader};
use credbox::{
    CipherSupport, CredboxError, CredentialVault, ErrorCategory, HostSecrets, JsonFileStore,
    Protection, ProtectionService, Result, Settings,
};

#[derive(Parser)]
#[command(name = "credbox")]
#[command(version)]
#[command(about = "At-rest protection of stored API credentials.", long_about = None)]
struct Cli {
    /// TOML configuration file with [secrets] and [protection] tables
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Encryption key (overrides the configuration file)
    #[arg(long, global = true, env = "LOGGED_IN_KEY", hide_env_values = true)]
    key: Option<String>,

    /// Integrity salt (overrides the configuration file)
    #[arg(long, global = true, env = "LOGGED_IN_SALT", hide_env_values = true)]
    salt: Option<String>,

    /// Disable the cipher; values pass through unprotected
    #[arg(long, global = true)]
    no_cipher: bool,

    /// Read the secret from stdin instead of from terminal
    #[arg(long, global = true)]
    secret_stdin: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a secret and print the blob
    #[command(alias = "e")]
    Encrypt,

    /// Decrypt a blob and print the secret
    #[command(alias = "d")]
    Decrypt {
        /// The blob to decrypt
        blob: String,
    },

    /// Encrypt a secret and store it under an option name
    Set {
        /// Path to the JSON option store
        #[arg(short, long, value_name = "FILE")]
        store: PathBuf,

        /// Option name
        name: String,
    },

    /// Decrypt and print the secret stored under an option name
    Get {
        /// Path to the JSON option store
        #[arg(short, long, value_name = "FILE")]
        store: PathBuf,

        /// Option name
        name: String,
    },

    /// Remove an option from the store
    Delete {
        /// Path to the JSON option store
        #[arg(short, long, value_name = "FILE")]
        store: PathBuf,

        /// Option name
        name: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        let mut msg = e.to_string();
        let mut source = e.source();
        while let Some(s) = source {
            msg.push_str(": ");
            msg.push_str(&s.to_string());
            source = s.source();
        }
        eprintln!("Error: {}", msg);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        _ => Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn run(mut cli: Cli) -> Result<()> {
    let service = build_service(&mut cli)?;

    match cli.command {
        Commands::Encrypt => {
            let secret = get_secret_reader(cli.secret_stdin).read_secret()?;
            let blob = service.encrypt(&secret)?;
            warn_if_passthrough(&blob);
            println!("{}", blob.as_inner());
        }
        Commands::Decrypt { blob } => {
            let secret = service.decrypt(&blob)?;
            warn_if_passthrough(&secret);
            println!("{}", secret.as_inner());
        }
        Commands::Set { store, name } => {
            let secret = get_secret_reader(cli.secret_stdin).read_secret()?;
            let mut vault = CredentialVault::new(JsonFileStore::new(store), service);
            let outcome = vault.put(&name, &secret)?;
            warn_if_passthrough(&outcome);
        }
        Commands::Get { store, name } => {
            let vault = CredentialVault::new(JsonFileStore::new(store), service);
            let secret = vault.get(&name)?.ok_or_else(|| {
                CredboxError::new(ErrorCategory::User, format!("option {} not found", name))
            })?;
            warn_if_passthrough(&secret);
            println!("{}", secret.as_inner());
        }
        Commands::Delete { store, name } => {
            let mut vault = CredentialVault::new(JsonFileStore::new(store), service);
            if !vault.remove(&name)? {
                return Err(CredboxError::new(
                    ErrorCategory::User,
                    format!("option {} not found", name),
                ));
            }
        }
    }

    Ok(())
}

/// File settings first, then environment and flags on top
///
/// The key and salt are moved out of `cli` so no plain copy outlives resolution.
fn build_service(cli: &mut Cli) -> Result<ProtectionService> {
    let settings = match &cli.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    let secrets = settings
        .secrets
        .overlay(HostSecrets::new(cli.key.take(), cli.salt.take()));
    let cipher = if cli.no_cipher {
        CipherSupport::Unavailable
    } else {
        settings.cipher
    };
    let settings = Settings { secrets, cipher };
    Ok(ProtectionService::new(settings.into_config()))
}

fn warn_if_passthrough<T>(outcome: &Protection<T>) {
    if outcome.is_passthrough() {
        eprintln!("warning: cipher unavailable, value passed through unprotected");
    }
}

fn get_secret_reader(use_stdin: bool) -> Box<dyn SecretReader> {
    if use_stdin {
        Box::new(ReaderSecretReader::new(Box::new(std::io::stdin())))
    } else {
        Box::new(TerminalSecretReader)
    }
}
