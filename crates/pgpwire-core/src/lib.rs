//! pgpwire-core: shared types, config schema, and error taxonomy
//!
//! Everything the armor codec, the engine boundary and the transcoding
//! pipeline need to agree on lives here so the crates above only depend
//! on one another through these types.

pub mod config;
pub mod error;
pub mod types;

pub use config::{KeyStoreConfig, PgpWireConfig};
pub use error::{ArmorError, PgpWireError, PgpWireResult};
pub use types::{Decoded, KeyHandle, KeyId, KeyMaterial, KeyRole, PrivateKeyHandle, WireCiphertext};
