use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Which half of the key pair a key file or import refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// Counterparty public key, used to encrypt outbound payloads
    Public,
    /// Local private key, used to decrypt inbound payloads
    Private,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::Public => f.write_str("public"),
            KeyRole::Private => f.write_str("private"),
        }
    }
}

/// Armored OpenPGP key text as read from its source. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the text carries a private key block marker.
    pub fn is_private(&self) -> bool {
        self.0.contains("PRIVATE KEY BLOCK")
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("len", &self.0.len())
            .field("private", &self.is_private())
            .finish()
    }
}

/// Engine-assigned key identifier (long id or fingerprint).
///
/// An empty id is representable on purpose: an engine may accept a key
/// without reporting an id, which only becomes an error when the id is used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyId(String);

impl KeyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KeyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque private key handle owned by an engine.
///
/// Carries the key id plus engine-private state that only the engine that
/// produced it can read back via [`PrivateKeyHandle::state`].
#[derive(Clone)]
pub struct PrivateKeyHandle {
    key_id: KeyId,
    state: Arc<dyn Any + Send + Sync>,
}

impl PrivateKeyHandle {
    pub fn new<S: Any + Send + Sync>(key_id: KeyId, state: S) -> Self {
        Self {
            key_id,
            state: Arc::new(state),
        }
    }

    pub fn key_id(&self) -> &KeyId {
        &self.key_id
    }

    /// Engine-private state, if it is of type `S`.
    pub fn state<S: Any>(&self) -> Option<&S> {
        self.state.downcast_ref::<S>()
    }

    /// True when both handles share the same underlying engine state.
    pub fn same_handle(&self, other: &PrivateKeyHandle) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for PrivateKeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKeyHandle")
            .field("key_id", &self.key_id)
            .field("state", &"[OPAQUE]")
            .finish()
    }
}

/// Result of importing key material into an engine
#[derive(Debug, Clone)]
pub enum KeyHandle {
    PublicKeyId(KeyId),
    PrivateKey(PrivateKeyHandle),
}

impl KeyHandle {
    pub fn role(&self) -> KeyRole {
        match self {
            KeyHandle::PublicKeyId(_) => KeyRole::Public,
            KeyHandle::PrivateKey(_) => KeyRole::Private,
        }
    }
}

/// Lowercase hex encoding of engine ciphertext, as exchanged with the
/// counterparty. The empty string means "no payload".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WireCiphertext(String);

impl WireCiphertext {
    pub fn new(wire: impl Into<String>) -> Self {
        Self(wire.into())
    }

    /// Hex-encode raw ciphertext bytes (lowercase, no separators, no prefix).
    pub fn from_bytes(ciphertext: &[u8]) -> Self {
        Self(hex::encode(ciphertext))
    }

    /// Decode back to raw ciphertext bytes. Fails on odd length or any
    /// non-hex character, whitespace included.
    pub fn to_bytes(&self) -> Result<Vec<u8>, hex::FromHexError> {
        hex::decode(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for WireCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for WireCiphertext {
    fn from(wire: String) -> Self {
        Self(wire)
    }
}

impl From<&str> for WireCiphertext {
    fn from(wire: &str) -> Self {
        Self(wire.to_string())
    }
}

/// Outcome of decoding a wire value.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// The wire value was empty and was passed through untouched
    Empty,
    /// A decrypted and parsed payload
    Payload(T),
}

impl<T> Decoded<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, Decoded::Empty)
    }

    pub fn payload(self) -> Option<T> {
        match self {
            Decoded::Empty => None,
            Decoded::Payload(payload) => Some(payload),
        }
    }
}

impl Decoded<serde_json::Value> {
    /// Collapse to a JSON value, handing the empty wire string back as `""`.
    pub fn into_value(self) -> serde_json::Value {
        match self {
            Decoded::Empty => serde_json::Value::String(String::new()),
            Decoded::Payload(value) => value,
        }
    }
}
