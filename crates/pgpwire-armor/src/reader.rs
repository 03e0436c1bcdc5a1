//! Armor envelope parsing
//!
//! Accepts LF or CRLF line endings, trailing whitespace on any line, and
//! arbitrary text before the BEGIN line. Text after the END line is ignored.

use base64::{engine::general_purpose::STANDARD as B64, Engine};
use pgpwire_core::{ArmorError, PgpWireResult};

use crate::armor::{ArmorHeaders, ArmoredMessage};
use crate::crc24::from_be_bytes;

/// Parse an armor block.
///
/// Fails with [`pgpwire_core::PgpWireError::MalformedArmor`] on broken framing.
/// A checksum that disagrees with the body is not an error here.
pub fn unarmor(text: &str) -> PgpWireResult<ArmoredMessage> {
    let mut lines = text.lines().map(str::trim_end);

    let marker = lines
        .by_ref()
        .find_map(|line| delimiter(line, "BEGIN"))
        .ok_or(ArmorError::MissingBegin)?
        .to_string();

    let mut headers = ArmorHeaders::new();
    loop {
        let line = lines
            .next()
            .ok_or_else(|| ArmorError::MissingEnd(marker.clone()))?;
        if line.is_empty() {
            break;
        }
        let (key, value) = parse_header(line)?;
        headers.insert(key, value)?;
    }

    let mut body_lines = Vec::new();
    let end_marker = loop {
        let line = lines
            .next()
            .ok_or_else(|| ArmorError::MissingEnd(marker.clone()))?;
        if let Some(end) = delimiter(line, "END") {
            break end;
        }
        body_lines.push(line);
    };

    if end_marker != marker {
        return Err(ArmorError::MarkerMismatch {
            begin: marker,
            end: end_marker.to_string(),
        }
        .into());
    }

    // The checksum is the last line before END; padding-only body lines
    // (possible with odd wrap widths) also start with '='.
    let checksum_line = match body_lines.pop() {
        Some(line) if line.starts_with('=') => line,
        _ => return Err(ArmorError::MissingChecksum.into()),
    };
    let checksum = parse_checksum(checksum_line)?;

    let mut encoded = String::with_capacity(body_lines.iter().map(|l| l.len()).sum());
    for (idx, line) in body_lines.iter().enumerate() {
        if let Some(ch) = line.chars().find(|c| !is_base64_char(*c) && *c != '=') {
            return Err(ArmorError::InvalidBase64Character { line: idx + 1, ch }.into());
        }
        encoded.push_str(line);
    }
    let body = B64
        .decode(encoded.as_bytes())
        .map_err(|e| ArmorError::InvalidBase64(e.to_string()))?;

    tracing::trace!(marker = %marker, bytes = body.len(), "parsed armor block");
    Ok(ArmoredMessage::from_parts(marker, headers, body, checksum))
}

/// `-----BEGIN <marker>-----` / `-----END <marker>-----`
fn delimiter<'a>(line: &'a str, kind: &str) -> Option<&'a str> {
    let marker = line
        .strip_prefix("-----")?
        .strip_prefix(kind)?
        .strip_prefix(' ')?
        .strip_suffix("-----")?;
    (!marker.is_empty()).then_some(marker)
}

fn parse_header(line: &str) -> Result<(&str, &str), ArmorError> {
    let malformed = || ArmorError::MalformedHeader(line.to_string());
    let (key, value) = line.split_once(':').ok_or_else(malformed)?;
    if key.is_empty() || key.chars().any(char::is_whitespace) {
        return Err(malformed());
    }
    Ok((key, value.trim_start()))
}

fn parse_checksum(line: &str) -> Result<u32, ArmorError> {
    let invalid = || ArmorError::InvalidChecksum(line.to_string());
    let encoded = line.strip_prefix('=').ok_or_else(invalid)?;
    if encoded.len() != 4 || !encoded.chars().all(is_base64_char) {
        return Err(invalid());
    }
    let decoded = B64.decode(encoded).map_err(|_| invalid())?;
    let bytes: [u8; 3] = decoded.try_into().map_err(|_| invalid())?;
    Ok(from_be_bytes(bytes))
}

fn is_base64_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '+' || c == '/'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::armor::{armor, Armorer};
    use crate::crc24::crc24;
    use pgpwire_core::PgpWireError;
    use proptest::prelude::*;

    fn armor_err(text: &str) -> ArmorError {
        match unarmor(text) {
            Err(PgpWireError::MalformedArmor(e)) => e,
            other => panic!("expected MalformedArmor, got {other:?}"),
        }
    }

    #[test]
    fn parses_two_byte_vector() {
        let msg = unarmor("-----BEGIN MESSAGE-----\n\nQUI=\n=TkUc\n-----END MESSAGE-----\n").unwrap();
        assert_eq!(msg.marker(), "MESSAGE");
        assert!(msg.headers().is_empty());
        assert_eq!(msg.body(), b"AB");
        assert_eq!(msg.checksum(), 0x4E451C);
        assert!(msg.verify_checksum().is_ok());
    }

    #[test]
    fn parses_headers_in_order() {
        let text = "-----BEGIN PGP MESSAGE-----\nVersion: GnuPG v2\nComment: two words\n\nQUI=\n=TkUc\n-----END PGP MESSAGE-----\n";
        let msg = unarmor(text).unwrap();
        let headers: Vec<_> = msg.headers().iter().collect();
        assert_eq!(headers, vec![("Version", "GnuPG v2"), ("Comment", "two words")]);
    }

    #[test]
    fn accepts_crlf_and_leading_text() {
        let text = "garbage before\r\n-----BEGIN PGP MESSAGE-----\r\n\r\nQUI=  \r\n=TkUc\r\n-----END PGP MESSAGE-----\r\ntrailer";
        let msg = unarmor(text).unwrap();
        assert_eq!(msg.body(), b"AB");
    }

    #[test]
    fn empty_body() {
        let msg = unarmor("-----BEGIN PGP MESSAGE-----\n\n=twTO\n-----END PGP MESSAGE-----\n").unwrap();
        assert!(msg.body().is_empty());
        assert!(msg.verify_checksum().is_ok());
    }

    #[test]
    fn not_an_armor_block() {
        assert_eq!(armor_err("not an armor block"), ArmorError::MissingBegin);
        assert_eq!(armor_err(""), ArmorError::MissingBegin);
    }

    #[test]
    fn missing_end() {
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\n\nQUI=\n=TkUc\n"),
            ArmorError::MissingEnd("PGP MESSAGE".into())
        );
    }

    #[test]
    fn mismatched_markers() {
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\n\nQUI=\n=TkUc\n-----END PGP SIGNATURE-----\n"),
            ArmorError::MarkerMismatch {
                begin: "PGP MESSAGE".into(),
                end: "PGP SIGNATURE".into(),
            }
        );
    }

    #[test]
    fn body_outside_alphabet() {
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\n\nQU*=\n=TkUc\n-----END PGP MESSAGE-----\n"),
            ArmorError::InvalidBase64Character { line: 1, ch: '*' }
        );
    }

    #[test]
    fn missing_blank_line_is_malformed_header() {
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\nQUI=\n=TkUc\n-----END PGP MESSAGE-----\n"),
            ArmorError::MalformedHeader("QUI=".into())
        );
    }

    #[test]
    fn missing_checksum() {
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\n\nQUI=\n-----END PGP MESSAGE-----\n"),
            ArmorError::MissingChecksum
        );
    }

    #[test]
    fn unparseable_checksum() {
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\n\nQUI=\n=TkU\n-----END PGP MESSAGE-----\n"),
            ArmorError::InvalidChecksum("=TkU".into())
        );
        assert_eq!(
            armor_err("-----BEGIN PGP MESSAGE-----\n\nQUI=\n=Tk!c\n-----END PGP MESSAGE-----\n"),
            ArmorError::InvalidChecksum("=Tk!c".into())
        );
    }

    #[test]
    fn checksum_mismatch_is_reported_not_raised() {
        let msg = unarmor("-----BEGIN MESSAGE-----\n\nQUI=\n=twTO\n-----END MESSAGE-----\n").unwrap();
        assert_eq!(msg.body(), b"AB");
        match msg.verify_checksum() {
            Err(PgpWireError::ChecksumMismatch { embedded, computed }) => {
                assert_eq!(embedded, 0xB704CE);
                assert_eq!(computed, 0x4E451C);
            }
            other => panic!("expected ChecksumMismatch, got {other:?}"),
        }
    }

    #[test]
    fn padding_only_line_with_odd_width() {
        // "AB" -> "QUI=" wrapped at 3 puts a lone '=' on its own line
        let text = Armorer::with_wrap_width(3).armor(b"AB", "PGP MESSAGE", &ArmorHeaders::new());
        assert!(text.contains("\nQUI\n=\n=TkUc\n"));
        assert_eq!(unarmor(&text).unwrap().body(), b"AB");
    }

    proptest! {
        #[test]
        fn armor_roundtrip(
            data in proptest::collection::vec(any::<u8>(), 0..=2048),
            marker in "[A-Z]{1,8}( [A-Z]{1,8}){0,3}",
        ) {
            let msg = unarmor(&armor(&data, &marker, &ArmorHeaders::new())).unwrap();
            prop_assert_eq!(msg.marker(), marker.as_str());
            prop_assert_eq!(msg.body(), data.as_slice());
            prop_assert_eq!(msg.checksum(), crc24(&data));
        }

        #[test]
        fn accepted_headers_roundtrip(
            pairs in proptest::collection::vec(
                ("[A-Za-z][A-Za-z0-9-]{0,15}", "[ -~]{0,40}"),
                0..6,
            ),
        ) {
            let headers = ArmorHeaders::from_pairs(pairs).unwrap();
            let msg = unarmor(&armor(b"AB", "PGP MESSAGE", &headers)).unwrap();
            prop_assert_eq!(msg.headers(), &headers);
            prop_assert_eq!(msg.body(), b"AB".as_slice());
        }
    }
}
