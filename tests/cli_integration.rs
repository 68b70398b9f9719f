//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

const GOLDEN_BLOB: &str = "AAECAwQFBgcICQoLDA0ODytteXBSMSttN3czTFE2THk1M3pkUGZTOGRybVNvbjVSNGF6a0loS3VaYVd2MThXc1loN3g2QVplTUNOQw==";

fn credbox_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_credbox"))
}

/// A command with host secrets cleared from the environment
fn credbox() -> Command {
    let mut cmd = Command::new(credbox_bin());
    cmd.env_remove("LOGGED_IN_KEY")
        .env_remove("LOGGED_IN_SALT")
        .env_remove("RUST_LOG");
    cmd
}

/// Run credbox with a secret on stdin
fn run_with_secret(args: &[&str], secret: &str) -> Output {
    let mut child = credbox()
        .arg("--secret-stdin")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to spawn credbox");

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading stdin
        let _ = stdin.write_all(secret.as_bytes());
    }

    child.wait_with_output().expect("failed to wait for credbox")
}

fn run(args: &[&str]) -> Output {
    credbox()
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("failed to run credbox")
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim_end().to_string()
}

fn assert_success(output: &Output, what: &str) {
    assert!(
        output.status.success(),
        "{} failed: {}",
        what,
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn test_decrypt_known_blob_with_fallback_secrets() {
    let output = run(&["decrypt", GOLDEN_BLOB]);
    assert_success(&output, "decrypt");
    assert_eq!(stdout_line(&output), "abc123-secret-token");

    // The fallback literals are flagged on every use.
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("fallback key"), "stderr: {}", stderr);
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let output = run_with_secret(&["--key", "cli-key", "--salt", "cli-salt", "encrypt"], "token\n");
    assert_success(&output, "encrypt");
    let blob = stdout_line(&output);
    assert_ne!(blob, "token");

    let output = run(&["--key", "cli-key", "--salt", "cli-salt", "decrypt", &blob]);
    assert_success(&output, "decrypt");
    assert_eq!(stdout_line(&output), "token");
}

#[test]
fn test_secrets_from_environment() {
    let output = credbox()
        .env("LOGGED_IN_KEY", "env-key")
        .env("LOGGED_IN_SALT", "env-salt")
        .args(["--secret-stdin", "encrypt"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            let _ = child.stdin.as_mut().unwrap().write_all(b"from-env");
            child.wait_with_output()
        })
        .unwrap();
    assert_success(&output, "encrypt");
    let blob = stdout_line(&output);

    let output = run(&["--key", "env-key", "--salt", "env-salt", "decrypt", &blob]);
    assert_success(&output, "decrypt");
    assert_eq!(stdout_line(&output), "from-env");
}

#[test]
fn test_decrypt_with_wrong_key_fails() {
    let output = run_with_secret(&["--key", "right", "--salt", "s", "encrypt"], "token");
    assert_success(&output, "encrypt");
    let blob = stdout_line(&output);

    let output = run(&["--key", "wrong", "--salt", "s", "decrypt", &blob]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("integrity check failed"), "stderr: {}", stderr);
    assert!(output.stdout.is_empty());
}

#[test]
fn test_decrypt_malformed_blob_fails() {
    let output = run(&["decrypt", "not-valid-base64!!"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("base64 decoding failed"), "stderr: {}", stderr);
}

#[test]
fn test_no_cipher_passthrough() {
    let output = run_with_secret(&["--no-cipher", "encrypt"], "plain-token");
    assert_success(&output, "encrypt");
    assert_eq!(stdout_line(&output), "plain-token");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unprotected"), "stderr: {}", stderr);
}

#[test]
fn test_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("credbox.toml");
    fs::write(
        &config_path,
        "[secrets]\nkey = \"file-key\"\nsalt = \"file-salt\"\n",
    )
    .unwrap();
    let config = config_path.to_str().unwrap();

    let output = run_with_secret(&["--config", config, "encrypt"], "configured");
    assert_success(&output, "encrypt");
    let blob = stdout_line(&output);

    let output = run(&["--key", "file-key", "--salt", "file-salt", "decrypt", &blob]);
    assert_success(&output, "decrypt");
    assert_eq!(stdout_line(&output), "configured");

    // Flags override the file.
    let output = run(&["--config", config, "--key", "other", "decrypt", &blob]);
    assert!(!output.status.success());
}

#[test]
fn test_empty_env_key_does_not_override_config() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("credbox.toml");
    fs::write(
        &config_path,
        "[secrets]\nkey = \"file-key\"\nsalt = \"file-salt\"\n",
    )
    .unwrap();

    let output = credbox()
        .env("LOGGED_IN_KEY", "")
        .env("LOGGED_IN_SALT", "")
        .args(["--config", config_path.to_str().unwrap(), "--secret-stdin", "encrypt"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .and_then(|mut child| {
            let _ = child.stdin.as_mut().unwrap().write_all(b"kept-file-key");
            child.wait_with_output()
        })
        .unwrap();
    assert_success(&output, "encrypt");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(!stderr.contains("fallback"), "stderr: {}", stderr);
    let blob = stdout_line(&output);

    let output = run(&["--key", "file-key", "--salt", "file-salt", "decrypt", &blob]);
    assert_success(&output, "decrypt");
    assert_eq!(stdout_line(&output), "kept-file-key");
}

#[test]
fn test_invalid_config_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("credbox.toml");
    fs::write(&config_path, "[protection]\ncipher = \"rot13\"\n").unwrap();

    let output = run(&["--config", config_path.to_str().unwrap(), "decrypt", GOLDEN_BLOB]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported cipher"), "stderr: {}", stderr);
}

#[test]
fn test_store_set_get_delete() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("options.json");
    let store = store_path.to_str().unwrap();
    let secrets = ["--key", "store-key", "--salt", "store-salt"];

    let args: Vec<&str> = secrets
        .iter()
        .copied()
        .chain(["set", "--store", store, "fts_twitter_custom_access_token"])
        .collect();
    let output = run_with_secret(&args, "oauth-token-value");
    assert_success(&output, "set");

    let contents = fs::read_to_string(&store_path).unwrap();
    assert!(contents.contains("fts_twitter_custom_access_token"));
    assert!(!contents.contains("oauth-token-value"));

    let args: Vec<&str> = secrets
        .iter()
        .copied()
        .chain(["get", "--store", store, "fts_twitter_custom_access_token"])
        .collect();
    let output = run(&args);
    assert_success(&output, "get");
    assert_eq!(stdout_line(&output), "oauth-token-value");

    let args: Vec<&str> = secrets
        .iter()
        .copied()
        .chain(["delete", "--store", store, "fts_twitter_custom_access_token"])
        .collect();
    assert_success(&run(&args), "delete");

    let args: Vec<&str> = secrets
        .iter()
        .copied()
        .chain(["get", "--store", store, "fts_twitter_custom_access_token"])
        .collect();
    let output = run(&args);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not found"), "stderr: {}", stderr);
}

#[test]
fn test_store_get_with_rotated_key_fails() {
    let temp_dir = TempDir::new().unwrap();
    let store_path = temp_dir.path().join("options.json");
    let store = store_path.to_str().unwrap();

    let output = run_with_secret(&["--key", "old", "set", "--store", store, "token"], "value");
    assert_success(&output, "set");

    let output = run(&["--key", "new", "get", "--store", store, "token"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to decrypt option token"), "stderr: {}", stderr);
}
