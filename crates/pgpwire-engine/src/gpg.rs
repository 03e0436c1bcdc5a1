//! GnuPG command-line engine
//!
//! Every operation is one `gpg` invocation with data on stdin and the result
//! on stdout:
//!   - import:  `--status-fd 1 --import`, fingerprint taken from `IMPORT_OK`
//!   - unlock:  detached signature over a probe string with the passphrase
//!              (loopback pinentry); success proves the passphrase
//!   - encrypt: `--recipient <id> --encrypt [--armor]`
//!   - decrypt: `--skip-verify --ignore-mdc-error --decrypt` on armored input
//!
//! The passphrase never appears on the command line. It is written to a
//! 0600 temp file handed over with `--passphrase-file`, removed once the
//! invocation returns.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pgpwire_core::config::GpgConfig;
use pgpwire_core::{KeyHandle, KeyId, KeyMaterial, PrivateKeyHandle};
use secrecy::{ExposeSecret, SecretString};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::{EncryptOptions, OpenPgpEngine};

/// Passed to every invocation. `--trust-model always` avoids the
/// "no assurance this key belongs to the named user" prompt.
const BASE_ARGS: &[&str] = &[
    "--batch",
    "--yes",
    "--no-tty",
    "--no-permission-warning",
    "--trust-model",
    "always",
];

const UNLOCK_PROBE: &[u8] = b"pgpwire unlock probe";

/// Engine state stored inside a [`PrivateKeyHandle`]
enum GpgKeyState {
    Locked,
    Unlocked { passphrase: SecretString },
}

#[derive(Debug, Clone)]
pub struct GpgEngine {
    program: String,
    homedir: Option<PathBuf>,
    extra_args: Vec<String>,
}

impl Default for GpgEngine {
    fn default() -> Self {
        Self::from_config(&GpgConfig::default())
    }
}

impl GpgEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &GpgConfig) -> Self {
        Self {
            program: config.program.clone(),
            homedir: config.homedir.clone(),
            extra_args: config.extra_args.clone(),
        }
    }

    pub fn with_homedir(mut self, homedir: impl Into<PathBuf>) -> Self {
        self.homedir = Some(homedir.into());
        self
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(BASE_ARGS);
        if let Some(homedir) = &self.homedir {
            cmd.arg("--homedir").arg(homedir);
        }
        cmd.args(&self.extra_args);
        cmd
    }

    fn import_command(&self) -> Command {
        let mut cmd = self.command();
        cmd.args(["--status-fd", "1", "--import"]);
        cmd
    }

    fn unlock_command(&self, key_id: &KeyId, passphrase_file: &Path) -> Command {
        let mut cmd = self.command();
        cmd.args(["--pinentry-mode", "loopback", "--passphrase-file"])
            .arg(passphrase_file)
            .args(["--local-user", key_id.as_str(), "--detach-sign"]);
        cmd
    }

    fn encrypt_command(&self, recipient: &KeyId, options: &EncryptOptions) -> Command {
        let mut cmd = self.command();
        cmd.args(["--recipient", recipient.as_str()]);
        if options.armor {
            cmd.arg("--armor");
        }
        cmd.arg("--encrypt");
        cmd
    }

    fn decrypt_command(&self, key_id: &KeyId, passphrase_file: &Path) -> Command {
        let mut cmd = self.command();
        cmd.args(["--pinentry-mode", "loopback", "--passphrase-file"])
            .arg(passphrase_file)
            .args([
                "--skip-verify",
                "--ignore-mdc-error",
                "--default-key",
                key_id.as_str(),
                "--decrypt",
            ]);
        cmd
    }

    /// Run `cmd` with `input` on stdin and return stdout.
    async fn run(&self, mut cmd: Command, input: Vec<u8>, op: &str) -> Result<Vec<u8>> {
        tracing::debug!(program = %self.program, op, bytes = input.len(), "running gpg");

        let mut child = cmd
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", self.program))?;

        // Feed stdin concurrently so a large output cannot fill the pipe and stall gpg
        let mut stdin = child.stdin.take().context("gpg stdin was not captured")?;
        let writer = tokio::spawn(async move { stdin.write_all(&input).await });

        let output = child
            .wait_with_output()
            .await
            .with_context(|| format!("waiting for gpg {op}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("gpg {op} failed ({}): {}", output.status, stderr.trim());
        }

        writer
            .await
            .context("gpg stdin writer task failed")?
            .with_context(|| format!("writing gpg {op} input"))?;

        Ok(output.stdout)
    }
}

/// Write `passphrase` to a fresh temp file, readable by the owner only.
/// The file is deleted when the returned handle drops.
fn passphrase_file(passphrase: &SecretString) -> Result<NamedTempFile> {
    let mut file = tempfile::Builder::new()
        .prefix("pgpwire-pass-")
        .tempfile()
        .context("creating passphrase file")?;
    file.write_all(passphrase.expose_secret().as_bytes())
        .context("writing passphrase file")?;
    file.flush().context("writing passphrase file")?;
    Ok(file)
}

/// First fingerprint from `[GNUPG:] IMPORT_OK <flags> <fingerprint>` status lines.
fn parse_import_fingerprint(status: &str) -> Option<String> {
    status.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some("[GNUPG:]"), Some("IMPORT_OK"), Some(_flags), Some(fpr)) => Some(fpr.to_string()),
            _ => None,
        }
    })
}

#[async_trait]
impl OpenPgpEngine for GpgEngine {
    async fn import_key(&self, material: &KeyMaterial) -> Result<KeyHandle> {
        let stdout = self
            .run(
                self.import_command(),
                material.as_str().as_bytes().to_vec(),
                "import",
            )
            .await?;
        let fingerprint = parse_import_fingerprint(&String::from_utf8_lossy(&stdout));

        if material.is_private() {
            let fpr = fingerprint.context("gpg imported the private key but reported no fingerprint")?;
            tracing::debug!(key_id = %fpr, "imported private key");
            return Ok(KeyHandle::PrivateKey(PrivateKeyHandle::new(
                KeyId::new(fpr),
                GpgKeyState::Locked,
            )));
        }

        match &fingerprint {
            Some(fpr) => tracing::debug!(key_id = %fpr, "imported public key"),
            None => tracing::warn!("gpg imported the public key but reported no fingerprint"),
        }
        Ok(KeyHandle::PublicKeyId(KeyId::new(
            fingerprint.unwrap_or_default(),
        )))
    }

    async fn unlock_key(
        &self,
        key: PrivateKeyHandle,
        passphrase: &SecretString,
    ) -> Result<PrivateKeyHandle> {
        match key.state::<GpgKeyState>() {
            Some(GpgKeyState::Locked) => {}
            Some(GpgKeyState::Unlocked { .. }) => {
                bail!("private key {} is already unlocked", key.key_id())
            }
            None => bail!("private key handle was not produced by the gpg engine"),
        }

        let pass_file = passphrase_file(passphrase)?;
        let cmd = self.unlock_command(key.key_id(), pass_file.path());
        self.run(cmd, UNLOCK_PROBE.to_vec(), "unlock")
            .await
            .context("passphrase rejected")?;
        drop(pass_file);

        Ok(PrivateKeyHandle::new(
            key.key_id().clone(),
            GpgKeyState::Unlocked {
                passphrase: SecretString::from(passphrase.expose_secret().to_string()),
            },
        ))
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &KeyId,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>> {
        if recipient.is_empty() {
            bail!("no recipient key id");
        }

        let cmd = self.encrypt_command(recipient, options);
        self.run(cmd, plaintext.to_vec(), "encrypt").await
    }

    async fn decrypt(&self, armored: &str, key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        let passphrase = match key.state::<GpgKeyState>() {
            Some(GpgKeyState::Unlocked { passphrase }) => passphrase,
            Some(GpgKeyState::Locked) => bail!("private key {} is still locked", key.key_id()),
            None => bail!("private key handle was not produced by the gpg engine"),
        };

        let pass_file = passphrase_file(passphrase)?;
        let cmd = self.decrypt_command(key.key_id(), pass_file.path());
        let plaintext = self.run(cmd, armored.as_bytes().to_vec(), "decrypt").await;
        drop(pass_file);
        plaintext
    }
}
