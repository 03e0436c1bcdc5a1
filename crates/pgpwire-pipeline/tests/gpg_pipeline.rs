//! Pipeline over the real `gpg` binary.
//!
//! A key pair is generated in a throwaway homedir and exported as armored
//! files; each pipeline then imports them into its own fresh homedir.
//! Every test returns early when `gpg` is not on PATH.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;

use pgpwire_core::{KeyStoreConfig, PgpWireError, WireCiphertext};
use pgpwire_engine::GpgEngine;
use pgpwire_pipeline::Pipeline;
use secrecy::SecretString;
use serde_json::json;
use tempfile::TempDir;

const USER_ID: &str = "pgpwire test <test@pgpwire.invalid>";
const PASSPHRASE: &str = "5wanp6eegH";

fn gpg_available() -> bool {
    Command::new("gpg")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

/// Stops the gpg-agent a homedir spawned, so tests leave no daemons behind.
struct Homedir(TempDir);

impl Homedir {
    fn new() -> Self {
        Self(TempDir::new().expect("create gpg homedir"))
    }

    fn path(&self) -> &Path {
        self.0.path()
    }
}

impl Drop for Homedir {
    fn drop(&mut self) {
        let _ = Command::new("gpgconf")
            .arg("--homedir")
            .arg(self.0.path())
            .args(["--kill", "gpg-agent"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
    }
}

fn gpg(homedir: &Path, args: &[&str]) -> Vec<u8> {
    let output = Command::new("gpg")
        .args(["--batch", "--yes", "--no-tty", "--homedir"])
        .arg(homedir)
        .args(args)
        .output()
        .expect("run gpg");
    assert!(
        output.status.success(),
        "gpg {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output.stdout
}

/// Generate a key pair and write `public_key.asc` / `private_key.asc` into `out`.
fn export_key_pair(keygen: &Homedir, out: &Path) -> (PathBuf, PathBuf) {
    let loopback = ["--pinentry-mode", "loopback", "--passphrase", PASSPHRASE];

    let mut generate = loopback.to_vec();
    generate.extend(["--quick-gen-key", USER_ID, "default", "default", "never"]);
    gpg(keygen.path(), &generate);

    let public = gpg(keygen.path(), &["--armor", "--export", USER_ID]);
    let mut export_secret = loopback.to_vec();
    export_secret.extend(["--armor", "--export-secret-keys", USER_ID]);
    let private = gpg(keygen.path(), &export_secret);

    let public_path = out.join("public_key.asc");
    let private_path = out.join("private_key.asc");
    std::fs::write(&public_path, public).unwrap();
    std::fs::write(&private_path, private).unwrap();
    (public_path, private_path)
}

fn gpg_pipeline(homedir: &Homedir, keys: &(PathBuf, PathBuf), passphrase: &str) -> Pipeline {
    let engine = Arc::new(GpgEngine::new().with_homedir(homedir.path()));
    Pipeline::new(
        engine,
        KeyStoreConfig {
            public_key_path: keys.0.clone(),
            private_key_path: keys.1.clone(),
            passphrase: SecretString::from(passphrase),
        },
    )
}

#[tokio::test]
async fn gpg_roundtrip() {
    if !gpg_available() {
        eprintln!("gpg not on PATH; skipping");
        return;
    }
    let keygen = Homedir::new();
    let files = TempDir::new().unwrap();
    let keys = export_key_pair(&keygen, files.path());

    let homedir = Homedir::new();
    let pipeline = gpg_pipeline(&homedir, &keys, PASSPHRASE);

    let payload = json!({ "a": 1, "n": { "s": "x" } });
    let wire = pipeline.encrypt(&payload).await.unwrap();
    assert!(wire.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!pipeline
        .ensure_loaded()
        .await
        .unwrap()
        .encryption_key_id()
        .is_empty());

    assert_eq!(pipeline.decrypt_value(&wire).await.unwrap(), payload);
    assert_eq!(
        pipeline.decrypt_value(&WireCiphertext::new("")).await.unwrap(),
        json!("")
    );
}

#[tokio::test]
async fn gpg_wrong_passphrase_is_passphrase_error() {
    if !gpg_available() {
        eprintln!("gpg not on PATH; skipping");
        return;
    }
    let keygen = Homedir::new();
    let files = TempDir::new().unwrap();
    let keys = export_key_pair(&keygen, files.path());

    let homedir = Homedir::new();
    let pipeline = gpg_pipeline(&homedir, &keys, "not-the-passphrase");

    let err = pipeline.encrypt(&json!({ "a": 1 })).await.unwrap_err();
    assert!(matches!(err, PgpWireError::Passphrase { .. }), "{err:?}");
    assert!(!pipeline.key_store().is_loaded());
}
