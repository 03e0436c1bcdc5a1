//! Deterministic in-memory engine for tests.
//!
//! Key material is real armor: the public block body is the key id, the
//! private block body is `key id NUL passphrase`. Ciphertext is a tagged
//! XOR of the plaintext with the recipient id. Nothing here is cryptographic.
//!
//! Decrypt parses its armored input and rejects checksum mismatches, so a
//! caller that re-armors ciphertext badly fails here the same way it would
//! against a real engine.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use pgpwire_armor::{
    armor, unarmor, ArmorHeaders, MESSAGE_MARKER, PRIVATE_KEY_MARKER, PUBLIC_KEY_MARKER,
};
use pgpwire_core::{KeyHandle, KeyId, KeyMaterial, PrivateKeyHandle};
use secrecy::{ExposeSecret, SecretString};

use crate::{EncryptOptions, OpenPgpEngine};

const CIPHERTEXT_MAGIC: &[u8] = b"PGPWIRE-MEM1";

struct MemoryKeyState {
    passphrase: String,
    unlocked: bool,
}

#[derive(Debug, Default)]
pub struct MemoryEngine {
    imports: AtomicUsize,
    unlocks: AtomicUsize,
    encrypts: AtomicUsize,
    decrypts: AtomicUsize,
    failing_imports: AtomicUsize,
    import_delay: Option<Duration>,
    unlocked: Mutex<HashSet<KeyId>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every import, to widen race windows in tests.
    pub fn with_import_delay(mut self, delay: Duration) -> Self {
        self.import_delay = Some(delay);
        self
    }

    /// Make the next `n` imports fail.
    pub fn fail_next_imports(&self, n: usize) {
        self.failing_imports.store(n, Ordering::SeqCst);
    }

    /// Armored (public, private) key material for `key_id`, locked with `passphrase`.
    pub fn generate_key_pair(key_id: &str, passphrase: &str) -> (KeyMaterial, KeyMaterial) {
        let headers = ArmorHeaders::new();

        let public = armor(key_id.as_bytes(), PUBLIC_KEY_MARKER, &headers);

        let mut secret = key_id.as_bytes().to_vec();
        secret.push(0);
        secret.extend_from_slice(passphrase.as_bytes());
        let private = armor(&secret, PRIVATE_KEY_MARKER, &headers);

        (KeyMaterial::new(public), KeyMaterial::new(private))
    }

    pub fn import_count(&self) -> usize {
        self.imports.load(Ordering::SeqCst)
    }

    pub fn unlock_count(&self) -> usize {
        self.unlocks.load(Ordering::SeqCst)
    }

    pub fn encrypt_count(&self) -> usize {
        self.encrypts.load(Ordering::SeqCst)
    }

    pub fn decrypt_count(&self) -> usize {
        self.decrypts.load(Ordering::SeqCst)
    }
}

fn xor_with_id(data: &[u8], id: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(id.iter().cycle())
        .map(|(b, k)| b ^ k ^ 0xA5)
        .collect()
}

#[async_trait]
impl OpenPgpEngine for MemoryEngine {
    async fn import_key(&self, material: &KeyMaterial) -> Result<KeyHandle> {
        self.imports.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.import_delay {
            tokio::time::sleep(delay).await;
        }
        if self
            .failing_imports
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            bail!("injected import failure");
        }

        let block = unarmor(material.as_str()).context("key material is not an armor block")?;
        block.verify_checksum()?;
        let marker = block.marker().to_string();
        let body = block.into_body();

        match marker.as_str() {
            PUBLIC_KEY_MARKER => {
                let id = String::from_utf8(body).context("public key id is not UTF-8")?;
                Ok(KeyHandle::PublicKeyId(KeyId::new(id)))
            }
            PRIVATE_KEY_MARKER => {
                let split = body
                    .iter()
                    .position(|b| *b == 0)
                    .context("private key block has no passphrase section")?;
                let id = std::str::from_utf8(&body[..split]).context("private key id is not UTF-8")?;
                let passphrase = std::str::from_utf8(&body[split + 1..])
                    .context("private key passphrase is not UTF-8")?;
                Ok(KeyHandle::PrivateKey(PrivateKeyHandle::new(
                    KeyId::new(id),
                    MemoryKeyState {
                        passphrase: passphrase.to_string(),
                        unlocked: false,
                    },
                )))
            }
            other => bail!("unexpected key block {other:?}"),
        }
    }

    async fn unlock_key(
        &self,
        key: PrivateKeyHandle,
        passphrase: &SecretString,
    ) -> Result<PrivateKeyHandle> {
        self.unlocks.fetch_add(1, Ordering::SeqCst);

        let state = key
            .state::<MemoryKeyState>()
            .context("private key handle was not produced by the memory engine")?;
        if state.unlocked {
            bail!("private key {} is already unlocked", key.key_id());
        }
        if state.passphrase != passphrase.expose_secret() {
            bail!("bad passphrase for private key {}", key.key_id());
        }

        {
            let mut unlocked = self
                .unlocked
                .lock()
                .map_err(|_| anyhow::anyhow!("memory engine key set poisoned"))?;
            if !unlocked.insert(key.key_id().clone()) {
                bail!("private key {} was already unlocked by this engine", key.key_id());
            }
        }

        Ok(PrivateKeyHandle::new(
            key.key_id().clone(),
            MemoryKeyState {
                passphrase: state.passphrase.clone(),
                unlocked: true,
            },
        ))
    }

    async fn encrypt(
        &self,
        plaintext: &[u8],
        recipient: &KeyId,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>> {
        self.encrypts.fetch_add(1, Ordering::SeqCst);
        if recipient.is_empty() {
            bail!("no recipient key id");
        }

        let id = recipient.as_str().as_bytes();
        let id_len = u16::try_from(id.len()).context("recipient key id too long")?;

        let mut ciphertext = CIPHERTEXT_MAGIC.to_vec();
        ciphertext.extend_from_slice(&id_len.to_be_bytes());
        ciphertext.extend_from_slice(id);
        ciphertext.extend_from_slice(&xor_with_id(plaintext, id));

        if options.armor {
            return Ok(armor(&ciphertext, MESSAGE_MARKER, &ArmorHeaders::new()).into_bytes());
        }
        Ok(ciphertext)
    }

    async fn decrypt(&self, armored: &str, key: &PrivateKeyHandle) -> Result<Vec<u8>> {
        self.decrypts.fetch_add(1, Ordering::SeqCst);

        let state = key
            .state::<MemoryKeyState>()
            .context("private key handle was not produced by the memory engine")?;
        if !state.unlocked {
            bail!("private key {} is still locked", key.key_id());
        }

        let block = unarmor(armored)?;
        if block.marker() != MESSAGE_MARKER {
            bail!("expected a {MESSAGE_MARKER} block, got {:?}", block.marker());
        }
        block.verify_checksum()?;

        let rest = block
            .body()
            .strip_prefix(CIPHERTEXT_MAGIC)
            .context("not a memory engine message")?;
        if rest.len() < 2 {
            bail!("truncated message header");
        }
        let id_len = usize::from(u16::from_be_bytes([rest[0], rest[1]]));
        let rest = &rest[2..];
        if rest.len() < id_len {
            bail!("truncated recipient id");
        }
        let (id, sealed) = rest.split_at(id_len);
        if id != key.key_id().as_str().as_bytes() {
            bail!("message is not addressed to key {}", key.key_id());
        }

        Ok(xor_with_id(sealed, id))
    }
}
