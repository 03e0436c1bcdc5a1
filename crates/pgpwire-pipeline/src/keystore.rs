//! Key store: one-time key import and private key unlock
//!
//! Load sequence (first call only):
//!   1. read the public key file, import it → encryption key id
//!   2. read the private key file, import it → locked private key
//!   3. unlock the private key with the passphrase → decryption key
//!
//! The sequence runs behind a `tokio::sync::OnceCell`: concurrent first
//! callers wait for a single loader, every caller then sees the same
//! `LoadedKeys`. A failed load leaves the cell empty, so the next call
//! starts over from step 1.

use std::path::Path;

use pgpwire_core::{
    KeyHandle, KeyId, KeyMaterial, KeyRole, KeyStoreConfig, PgpWireError, PgpWireResult,
    PrivateKeyHandle,
};
use pgpwire_engine::OpenPgpEngine;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

/// Key handles available once the store is loaded. Read-only after load.
#[derive(Debug, Clone)]
pub struct LoadedKeys {
    encryption_key_id: KeyId,
    decryption_key: PrivateKeyHandle,
}

impl LoadedKeys {
    /// Recipient id for outbound payloads. May be empty if the engine
    /// reported no id for the public key.
    pub fn encryption_key_id(&self) -> &KeyId {
        &self.encryption_key_id
    }

    /// Unlocked private key for inbound payloads.
    pub fn decryption_key(&self) -> &PrivateKeyHandle {
        &self.decryption_key
    }
}

#[derive(Debug)]
pub struct KeyStore {
    config: KeyStoreConfig,
    keys: OnceCell<LoadedKeys>,
}

impl KeyStore {
    pub fn new(config: KeyStoreConfig) -> Self {
        Self {
            config,
            keys: OnceCell::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.keys.initialized()
    }

    pub fn get(&self) -> Option<&LoadedKeys> {
        self.keys.get()
    }

    /// Load the keys if no earlier call has, and return them.
    ///
    /// Idempotent: once loaded, returns immediately without touching the
    /// filesystem or the engine.
    pub async fn ensure_loaded(&self, engine: &dyn OpenPgpEngine) -> PgpWireResult<&LoadedKeys> {
        self.keys.get_or_try_init(|| self.load(engine)).await
    }

    async fn load(&self, engine: &dyn OpenPgpEngine) -> PgpWireResult<LoadedKeys> {
        debug!(
            public = %self.config.public_key_path.display(),
            private = %self.config.private_key_path.display(),
            "loading keys"
        );

        let public = read_key_material(KeyRole::Public, &self.config.public_key_path).await?;
        let encryption_key_id = match import(engine, KeyRole::Public, &public).await? {
            KeyHandle::PublicKeyId(id) => id,
            KeyHandle::PrivateKey(_) => {
                return Err(wrong_role(KeyRole::Public, &self.config.public_key_path))
            }
        };
        if encryption_key_id.is_empty() {
            warn!("public key import reported no key id; encryption will fail");
        }

        let private = read_key_material(KeyRole::Private, &self.config.private_key_path).await?;
        let locked = match import(engine, KeyRole::Private, &private).await? {
            KeyHandle::PrivateKey(handle) => handle,
            KeyHandle::PublicKeyId(_) => {
                return Err(wrong_role(KeyRole::Private, &self.config.private_key_path))
            }
        };

        let decryption_key = engine
            .unlock_key(locked, &self.config.passphrase)
            .await
            .map_err(|source| PgpWireError::Passphrase { source })?;

        info!(
            encryption_key_id = %encryption_key_id,
            decryption_key_id = %decryption_key.key_id(),
            "keys loaded"
        );
        Ok(LoadedKeys {
            encryption_key_id,
            decryption_key,
        })
    }
}

async fn read_key_material(role: KeyRole, path: &Path) -> PgpWireResult<KeyMaterial> {
    tokio::fs::read_to_string(path)
        .await
        .map(KeyMaterial::new)
        .map_err(|source| PgpWireError::KeyFile {
            role,
            path: path.to_path_buf(),
            source,
        })
}

async fn import(
    engine: &dyn OpenPgpEngine,
    role: KeyRole,
    material: &KeyMaterial,
) -> PgpWireResult<KeyHandle> {
    engine
        .import_key(material)
        .await
        .map_err(|source| PgpWireError::KeyImport { role, source })
}

fn wrong_role(expected: KeyRole, path: &Path) -> PgpWireError {
    PgpWireError::KeyImport {
        role: expected,
        source: anyhow::anyhow!("{} does not hold a {expected} key", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgpwire_engine::MemoryEngine;
    use secrecy::SecretString;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_keys(dir: &Path, key_id: &str, passphrase: &str) -> (PathBuf, PathBuf) {
        let (public, private) = MemoryEngine::generate_key_pair(key_id, passphrase);
        let public_path = dir.join("public_key.asc");
        let private_path = dir.join("private_key.asc");
        std::fs::write(&public_path, public.as_str()).unwrap();
        std::fs::write(&private_path, private.as_str()).unwrap();
        (public_path, private_path)
    }

    fn store(public: PathBuf, private: PathBuf, passphrase: &str) -> KeyStore {
        KeyStore::new(KeyStoreConfig {
            public_key_path: public,
            private_key_path: private,
            passphrase: SecretString::from(passphrase.to_string()),
        })
    }

    #[tokio::test]
    async fn sequential_loads_do_the_work_once() {
        let tmp = TempDir::new().unwrap();
        let (public, private) = write_keys(tmp.path(), "CGATE-01", "5wanp6eegH");
        let engine = MemoryEngine::new();
        let keys = store(public, private, "5wanp6eegH");

        assert!(!keys.is_loaded());
        let first = keys.ensure_loaded(&engine).await.unwrap();
        for _ in 0..4 {
            let again = keys.ensure_loaded(&engine).await.unwrap();
            assert!(std::ptr::eq(first, again));
            assert!(again.decryption_key().same_handle(first.decryption_key()));
        }

        assert!(keys.is_loaded());
        assert_eq!(first.encryption_key_id().as_str(), "CGATE-01");
        assert_eq!(engine.import_count(), 2);
        assert_eq!(engine.unlock_count(), 1);
    }

    #[tokio::test]
    async fn loaded_store_does_not_reread_files() {
        let tmp = TempDir::new().unwrap();
        let (public, private) = write_keys(tmp.path(), "K", "pw");
        let engine = MemoryEngine::new();
        let keys = store(public.clone(), private.clone(), "pw");

        keys.ensure_loaded(&engine).await.unwrap();
        std::fs::remove_file(&public).unwrap();
        std::fs::remove_file(&private).unwrap();

        assert!(keys.ensure_loaded(&engine).await.is_ok());
        assert_eq!(engine.import_count(), 2);
    }

    #[tokio::test]
    async fn missing_key_file_then_retry() {
        let tmp = TempDir::new().unwrap();
        let public = tmp.path().join("public_key.asc");
        let private = tmp.path().join("private_key.asc");
        let engine = MemoryEngine::new();
        let keys = store(public.clone(), private.clone(), "pw");

        match keys.ensure_loaded(&engine).await {
            Err(PgpWireError::KeyFile { role, path, .. }) => {
                assert_eq!(role, KeyRole::Public);
                assert_eq!(path, public);
            }
            other => panic!("expected KeyFile, got {other:?}"),
        }
        assert!(!keys.is_loaded());
        assert_eq!(engine.import_count(), 0);

        write_keys(tmp.path(), "K", "pw");
        assert!(keys.ensure_loaded(&engine).await.is_ok());
        assert!(keys.is_loaded());
    }

    #[tokio::test]
    async fn wrong_passphrase_is_passphrase_error_and_not_cached() {
        let tmp = TempDir::new().unwrap();
        let (public, private) = write_keys(tmp.path(), "K", "right");
        let engine = MemoryEngine::new();
        let keys = store(public, private, "wrong");

        for _ in 0..2 {
            let err = keys.ensure_loaded(&engine).await.unwrap_err();
            assert!(matches!(err, PgpWireError::Passphrase { .. }), "{err:?}");
            assert!(!keys.is_loaded());
        }
        // every attempt starts over from the public key
        assert_eq!(engine.import_count(), 4);
        assert_eq!(engine.unlock_count(), 2);
    }

    #[tokio::test]
    async fn engine_rejection_is_key_import_error() {
        let tmp = TempDir::new().unwrap();
        let (public, private) = write_keys(tmp.path(), "K", "pw");
        let engine = MemoryEngine::new();
        engine.fail_next_imports(1);
        let keys = store(public, private, "pw");

        match keys.ensure_loaded(&engine).await {
            Err(PgpWireError::KeyImport { role, .. }) => assert_eq!(role, KeyRole::Public),
            other => panic!("expected KeyImport, got {other:?}"),
        }
        assert!(keys.ensure_loaded(&engine).await.is_ok());
    }

    #[tokio::test]
    async fn swapped_key_files_are_rejected() {
        let tmp = TempDir::new().unwrap();
        let (public, private) = write_keys(tmp.path(), "K", "pw");
        let engine = MemoryEngine::new();
        let keys = store(private, public, "pw");

        match keys.ensure_loaded(&engine).await {
            Err(PgpWireError::KeyImport { role, source }) => {
                assert_eq!(role, KeyRole::Public);
                assert!(source.to_string().contains("does not hold a public key"));
            }
            other => panic!("expected KeyImport, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn garbage_key_material_is_key_import_error() {
        let tmp = TempDir::new().unwrap();
        let public = tmp.path().join("public_key.asc");
        let private = tmp.path().join("private_key.asc");
        std::fs::write(&public, "this is not a key").unwrap();
        std::fs::write(&private, "neither is this").unwrap();

        let keys = store(public, private, "pw");
        let err = keys.ensure_loaded(&MemoryEngine::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PgpWireError::KeyImport {
                role: KeyRole::Public,
                ..
            }
        ));
        assert!(err.is_key_error());
    }
}
