use std::sync::Arc;

use pgpwire_armor::{ArmorHeaders, Armorer, MESSAGE_MARKER};
use pgpwire_core::{Decoded, KeyStoreConfig, PgpWireError, PgpWireResult, WireCiphertext};
use pgpwire_engine::{EncryptOptions, OpenPgpEngine};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::keystore::{KeyStore, LoadedKeys};

/// Transcodes structured payloads to and from the hex wire form.
///
/// Outbound ciphertext is binary OpenPGP rendered as hex. Inbound hex is
/// decoded and re-armored as a `PGP MESSAGE` block before the engine sees it.
pub struct Pipeline {
    engine: Arc<dyn OpenPgpEngine>,
    keys: KeyStore,
    armorer: Armorer,
}

impl Pipeline {
    pub fn new(engine: Arc<dyn OpenPgpEngine>, config: KeyStoreConfig) -> Self {
        Self {
            engine,
            keys: KeyStore::new(config),
            armorer: Armorer::default(),
        }
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    pub async fn ensure_loaded(&self) -> PgpWireResult<&LoadedKeys> {
        self.keys.ensure_loaded(self.engine.as_ref()).await
    }

    /// Serialize `payload` to JSON, encrypt it for the loaded public key and
    /// return the ciphertext as lowercase hex.
    pub async fn encrypt<T>(&self, payload: &T) -> PgpWireResult<WireCiphertext>
    where
        T: Serialize + Sync + ?Sized,
    {
        let keys = self.ensure_loaded().await?;
        let recipient = keys.encryption_key_id();
        if recipient.is_empty() {
            return Err(PgpWireError::MissingKey);
        }

        let plaintext = serde_json::to_vec(payload).map_err(PgpWireError::Serialize)?;
        let ciphertext = self
            .engine
            .encrypt(&plaintext, recipient, &EncryptOptions::binary())
            .await
            .map_err(|source| PgpWireError::Encryption { source })?;

        debug!(
            recipient = %recipient,
            plaintext_bytes = plaintext.len(),
            ciphertext_bytes = ciphertext.len(),
            "payload encrypted"
        );
        Ok(WireCiphertext::from_bytes(&ciphertext))
    }

    /// Decrypt a hex wire value back into a payload.
    ///
    /// An empty wire value is passed through as [`Decoded::Empty`] without
    /// loading keys or calling the engine.
    pub async fn decrypt<T>(&self, wire: &WireCiphertext) -> PgpWireResult<Decoded<T>>
    where
        T: DeserializeOwned,
    {
        if wire.is_empty() {
            debug!("empty wire value passed through");
            return Ok(Decoded::Empty);
        }

        let keys = self.ensure_loaded().await?;
        let ciphertext = wire.to_bytes()?;
        let armored = self
            .armorer
            .armor(&ciphertext, MESSAGE_MARKER, &ArmorHeaders::new());

        let plaintext = self
            .engine
            .decrypt(&armored, keys.decryption_key())
            .await
            .map_err(|source| PgpWireError::Decryption { source })?;
        let payload = serde_json::from_slice(&plaintext).map_err(PgpWireError::InvalidPayload)?;

        debug!(
            ciphertext_bytes = ciphertext.len(),
            plaintext_bytes = plaintext.len(),
            "payload decrypted"
        );
        Ok(Decoded::Payload(payload))
    }

    /// [`Pipeline::decrypt`] into a JSON value, with the empty wire value
    /// mapped to an empty JSON string.
    pub async fn decrypt_value(&self, wire: &WireCiphertext) -> PgpWireResult<serde_json::Value> {
        Ok(self.decrypt(wire).await?.into_value())
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("keys", &self.keys)
            .field("armorer", &self.armorer)
            .finish_non_exhaustive()
    }
}
