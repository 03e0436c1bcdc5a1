//! pgpwire-pipeline: key store and payload transcoding
//!
//! Outbound: payload → JSON → engine encrypt → lowercase hex
//! Inbound:  hex → bytes → armor ("PGP MESSAGE") → engine decrypt → JSON → payload
//!
//! Both directions share one [`KeyStore`], loaded at most once per pipeline.

pub mod keystore;
pub mod pipeline;

pub use keystore::{KeyStore, LoadedKeys};
pub use pipeline::Pipeline;
