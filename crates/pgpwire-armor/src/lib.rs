//! pgpwire-armor: OpenPGP ASCII armor (RFC 4880 section 6)
//!
//! # Overview
//! - `crc24`: the 24-bit armor checksum, computed over the raw (not base64) bytes
//! - `armor`: builds the `-----BEGIN/END <MARKER>-----` envelope with optional
//!   headers, a base64 body wrapped at a fixed width and a `=` checksum line
//! - `reader`: parses an envelope back into an [`ArmoredMessage`]
//!
//! Parsing is framing only. A checksum that disagrees with the body is
//! reported by [`ArmoredMessage::verify_checksum`], never by [`unarmor`].

pub mod armor;
pub mod crc24;
pub mod reader;

pub use armor::{armor, ArmorHeaders, ArmoredMessage, Armorer, DEFAULT_WRAP_WIDTH};
pub use self::crc24::crc24;
pub use reader::unarmor;

/// Marker of an encrypted or signed message
pub const MESSAGE_MARKER: &str = "PGP MESSAGE";
/// Marker of a transferable public key
pub const PUBLIC_KEY_MARKER: &str = "PGP PUBLIC KEY BLOCK";
/// Marker of a transferable secret key
pub const PRIVATE_KEY_MARKER: &str = "PGP PRIVATE KEY BLOCK";
/// Marker of a detached signature
pub const SIGNATURE_MARKER: &str = "PGP SIGNATURE";
