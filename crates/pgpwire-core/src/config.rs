use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{PgpWireError, PgpWireResult};

/// Top-level configuration (loaded from pgpwire.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PgpWireConfig {
    pub keys: KeysConfig,
    pub gpg: GpgConfig,
    pub log: LogConfig,
}

impl PgpWireConfig {
    pub fn from_toml_str(toml_str: &str) -> PgpWireResult<Self> {
        toml::from_str(toml_str).map_err(|e| PgpWireError::Config(e.to_string()))
    }

    pub fn to_toml_string(&self) -> PgpWireResult<String> {
        toml::to_string_pretty(self).map_err(|e| PgpWireError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// Counterparty public key, armored (default: keys/public_key.asc)
    pub public_key_path: PathBuf,
    /// Local private key, armored (default: keys/private_key.asc)
    pub private_key_path: PathBuf,
    /// File holding the private key passphrase on its first line
    pub passphrase_file: Option<PathBuf>,
}

impl KeysConfig {
    /// Pair the configured key paths with a passphrase.
    pub fn with_passphrase(&self, passphrase: SecretString) -> KeyStoreConfig {
        KeyStoreConfig {
            public_key_path: self.public_key_path.clone(),
            private_key_path: self.private_key_path.clone(),
            passphrase,
        }
    }

    /// Read the passphrase from `passphrase_file`, if one is configured.
    ///
    /// Only the first line is used; the trailing newline is not part of the
    /// passphrase.
    pub fn read_passphrase_file(&self) -> PgpWireResult<Option<SecretString>> {
        let Some(path) = &self.passphrase_file else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path).map_err(|e| {
            PgpWireError::Config(format!("reading passphrase file {}: {e}", path.display()))
        })?;
        let first_line = content.lines().next().unwrap_or_default();
        Ok(Some(SecretString::from(first_line.to_string())))
    }
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            public_key_path: PathBuf::from("keys/public_key.asc"),
            private_key_path: PathBuf::from("keys/private_key.asc"),
            passphrase_file: None,
        }
    }
}

/// Settings for the `gpg` command-line engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpgConfig {
    /// gpg executable (default: gpg, resolved through PATH)
    pub program: String,
    /// Keyring directory passed as --homedir (default: gpg's own default)
    pub homedir: Option<PathBuf>,
    /// Extra arguments appended to every invocation
    pub extra_args: Vec<String>,
}

impl Default for GpgConfig {
    fn default() -> Self {
        Self {
            program: "gpg".into(),
            homedir: None,
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Everything the key store needs to load the key pair once.
#[derive(Debug)]
pub struct KeyStoreConfig {
    pub public_key_path: PathBuf,
    pub private_key_path: PathBuf,
    pub passphrase: SecretString,
}
