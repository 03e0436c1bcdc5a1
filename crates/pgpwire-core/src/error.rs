use std::path::PathBuf;

use thiserror::Error;

use crate::types::KeyRole;

pub type PgpWireResult<T> = Result<T, PgpWireError>;

#[derive(Debug, Error)]
pub enum PgpWireError {
    #[error("reading {role} key file {}: {source}", path.display())]
    KeyFile {
        role: KeyRole,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("importing {role} key: {source}")]
    KeyImport {
        role: KeyRole,
        #[source]
        source: anyhow::Error,
    },

    #[error("unlocking private key: {source}")]
    Passphrase {
        #[source]
        source: anyhow::Error,
    },

    #[error("malformed armor: {0}")]
    MalformedArmor(#[from] ArmorError),

    #[error("armor checksum mismatch: embedded {embedded:06X}, computed {computed:06X}")]
    ChecksumMismatch { embedded: u32, computed: u32 },

    #[error("no encryption key id available after key import")]
    MissingKey,

    #[error("encryption failed: {source}")]
    Encryption {
        #[source]
        source: anyhow::Error,
    },

    #[error("decryption failed: {source}")]
    Decryption {
        #[source]
        source: anyhow::Error,
    },

    /// From the caller's side a plaintext that does not parse is
    /// indistinguishable from a ciphertext that never decrypted correctly.
    #[error("decryption failed: plaintext is not a valid payload: {0}")]
    InvalidPayload(#[source] serde_json::Error),

    #[error("wire ciphertext is not valid hex: {0}")]
    WireDecode(#[from] hex::FromHexError),

    #[error("serializing payload: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Framing failures reported by the armor parser.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArmorError {
    #[error("no -----BEGIN <marker>----- line")]
    MissingBegin,

    #[error("no -----END {0}----- line")]
    MissingEnd(String),

    #[error("BEGIN marker {begin:?} does not match END marker {end:?}")]
    MarkerMismatch { begin: String, end: String },

    #[error("header line is not `key: value`: {0:?}")]
    MalformedHeader(String),

    #[error("character {ch:?} outside the base64 alphabet on body line {line}")]
    InvalidBase64Character { line: usize, ch: char },

    #[error("body is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("no checksum line before the END line")]
    MissingChecksum,

    #[error("checksum line is not `=` followed by 4 base64 characters: {0:?}")]
    InvalidChecksum(String),
}

impl PgpWireError {
    /// True for the failures caused by key material or its passphrase,
    /// as opposed to a single payload.
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            PgpWireError::KeyFile { .. }
                | PgpWireError::KeyImport { .. }
                | PgpWireError::Passphrase { .. }
                | PgpWireError::MissingKey
        )
    }
}
