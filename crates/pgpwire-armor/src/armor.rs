//! Armor envelope construction
//!
//! Layout produced by [`Armorer::armor`]:
//! ```text
//! -----BEGIN PGP MESSAGE-----
//! Comment: optional headers, one per line
//!
//! hQEMA...base64 body, wrapped at 76 columns...
//! =TkUc
//! -----END PGP MESSAGE-----
//! ```
//! The blank line after the headers is always written, even with no headers.

use std::fmt;

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use pgpwire_core::{ArmorError, PgpWireError, PgpWireResult};

use crate::crc24::{crc24, to_be_bytes};

/// Base64 body line width used by GnuPG and expected by the counterparty
pub const DEFAULT_WRAP_WIDTH: usize = 76;

/// Armor header fields (`key: value`), kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArmorHeaders {
    entries: Vec<(String, String)>,
}

impl ArmorHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a header. An existing key keeps its position and takes the new value.
    ///
    /// Keys must be non-empty and free of `:`, whitespace and control
    /// characters; values must be a single line. Surrounding whitespace on the
    /// value is dropped, as a parse of the written line would drop it.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), ArmorError> {
        let key = key.into();
        let value = value.into();
        let key_ok = !key.is_empty()
            && !key
                .chars()
                .any(|c| c == ':' || c.is_whitespace() || c.is_control());
        let value_ok = !value.chars().any(|c| c == '\n' || c == '\r');
        if !key_ok || !value_ok {
            return Err(ArmorError::MalformedHeader(format!("{key}: {value}")));
        }

        let value = value.trim().to_string();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Collect `(key, value)` pairs, failing on the first invalid header.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ArmorError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut headers = ArmorHeaders::new();
        for (key, value) in pairs {
            headers.insert(key, value)?;
        }
        Ok(headers)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Armor encoder with a configurable body wrap width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Armorer {
    wrap_width: usize,
}

impl Default for Armorer {
    fn default() -> Self {
        Self {
            wrap_width: DEFAULT_WRAP_WIDTH,
        }
    }
}

impl Armorer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap body lines at `width` characters. A width of 0 is treated as 1.
    pub fn with_wrap_width(width: usize) -> Self {
        Self {
            wrap_width: width.max(1),
        }
    }

    pub fn wrap_width(&self) -> usize {
        self.wrap_width
    }

    /// Encode `data` under `marker` (uppercased on output) with `headers`.
    pub fn armor(&self, data: &[u8], marker: &str, headers: &ArmorHeaders) -> String {
        let marker = marker.to_uppercase();
        let body = B64.encode(data);
        let checksum = B64.encode(to_be_bytes(crc24(data)));

        let mut text = String::with_capacity(body.len() + body.len() / self.wrap_width + 96);
        text.push_str("-----BEGIN ");
        text.push_str(&marker);
        text.push_str("-----\n");

        for (key, value) in headers.iter() {
            text.push_str(key);
            text.push_str(": ");
            text.push_str(value);
            text.push('\n');
        }
        text.push('\n');

        // base64 output is ASCII, so byte offsets are char boundaries
        let mut rest = body.as_str();
        while !rest.is_empty() {
            let (line, tail) = rest.split_at(self.wrap_width.min(rest.len()));
            text.push_str(line);
            text.push('\n');
            rest = tail;
        }

        text.push('=');
        text.push_str(&checksum);
        text.push('\n');

        text.push_str("-----END ");
        text.push_str(&marker);
        text.push_str("-----\n");

        tracing::trace!(marker = %marker, bytes = data.len(), "armored block");
        text
    }
}

/// Armor `data` with the default 76-column wrap.
pub fn armor(data: &[u8], marker: &str, headers: &ArmorHeaders) -> String {
    Armorer::default().armor(data, marker, headers)
}

/// A decoded (or to-be-encoded) armor block.
///
/// Built with [`ArmoredMessage::new`], the checksum always equals the CRC24
/// of the body. Parsed by [`crate::unarmor`], it holds whatever checksum the
/// text carried; compare with [`ArmoredMessage::verify_checksum`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmoredMessage {
    marker: String,
    headers: ArmorHeaders,
    body: Vec<u8>,
    checksum: u32,
}

impl ArmoredMessage {
    pub fn new(marker: impl Into<String>, body: Vec<u8>) -> Self {
        let checksum = crc24(&body);
        Self {
            marker: marker.into().to_uppercase(),
            headers: ArmorHeaders::new(),
            body,
            checksum,
        }
    }

    pub fn with_header(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<Self, ArmorError> {
        self.headers.insert(key, value)?;
        Ok(self)
    }

    pub(crate) fn from_parts(
        marker: String,
        headers: ArmorHeaders,
        body: Vec<u8>,
        checksum: u32,
    ) -> Self {
        Self {
            marker,
            headers,
            body,
            checksum,
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    pub fn headers(&self) -> &ArmorHeaders {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Vec<u8> {
        self.body
    }

    /// Checksum carried by the block (embedded in parsed text).
    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// CRC24 recomputed over the body.
    pub fn computed_checksum(&self) -> u32 {
        crc24(&self.body)
    }

    pub fn verify_checksum(&self) -> PgpWireResult<()> {
        let computed = self.computed_checksum();
        if computed == self.checksum {
            Ok(())
        } else {
            Err(PgpWireError::ChecksumMismatch {
                embedded: self.checksum,
                computed,
            })
        }
    }

    /// Re-encode with `armorer`. The emitted checksum is recomputed from the body.
    pub fn to_armored(&self, armorer: &Armorer) -> String {
        armorer.armor(&self.body, &self.marker, &self.headers)
    }
}

impl fmt::Display for ArmoredMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_armored(&Armorer::default()))
    }
}
