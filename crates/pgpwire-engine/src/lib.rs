//! pgpwire-engine: the OpenPGP engine boundary
//!
//! The pipeline never touches public-key cryptography itself. It talks to an
//! [`OpenPgpEngine`], which imports keys, unlocks the private key once, and
//! encrypts / decrypts opaque byte strings.
//!
//! Implementations:
//!   - [`gpg::GpgEngine`]: drives the `gpg` command-line tool
//!   - `memory::MemoryEngine` (feature `test-util`): deterministic loopback
//!     engine for tests, not cryptographic

pub mod gpg;
#[cfg(any(test, feature = "test-util"))]
pub mod memory;

pub use gpg::GpgEngine;
#[cfg(any(test, feature = "test-util"))]
pub use memory::MemoryEngine;

use async_trait::async_trait;
use pgpwire_core::{KeyHandle, KeyId, KeyMaterial, PrivateKeyHandle};
use secrecy::SecretString;

/// Output options for [`OpenPgpEngine::encrypt`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Ask the engine for armored output instead of binary packets
    pub armor: bool,
}

impl EncryptOptions {
    pub fn binary() -> Self {
        Self { armor: false }
    }

    pub fn armored() -> Self {
        Self { armor: true }
    }
}

#[async_trait]
pub trait OpenPgpEngine: Send + Sync {
    /// Import armored key material.
    ///
    /// Public material yields [`KeyHandle::PublicKeyId`] (possibly with an
    /// empty id if the engine reported none); private material yields a
    /// still-locked [`KeyHandle::PrivateKey`].
    async fn import_key(&self, material: &KeyMaterial) -> anyhow::Result<KeyHandle>;

    /// Unlock an imported private key with its passphrase.
    ///
    /// Mutates engine state; callers must do this at most once per key.
    async fn unlock_key(
        &self,
        key: PrivateKeyHandle,
        passphrase: &SecretString,
    ) -> anyhow::Result<PrivateKeyHandle>;

    /// Encrypt `plaintext` to `recipient`, returning ciphertext bytes.
    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &KeyId,
        options: &EncryptOptions,
    ) -> anyhow::Result<Vec<u8>>;

    /// Decrypt an armored message with an unlocked private key.
    async fn decrypt(&self, armored: &str, key: &PrivateKeyHandle) -> anyhow::Result<Vec<u8>>;
}
