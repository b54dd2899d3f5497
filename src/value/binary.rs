//  SPDX-FileCopyrightText: 2025 Greg Heartsfield <scsibug@imap.cc>
//  SPDX-License-Identifier: GPL-3.0-or-later

//! Codecs for the `hexBinary` and `base64Binary` datatypes.

use super::LexicalError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decode a hexBinary lexical form; either letter case is accepted.
pub(crate) fn parse_hex(lexical: &str) -> Result<Vec<u8>, LexicalError> {
    hex::decode(lexical).map_err(|_| LexicalError::new("hexBinary", lexical))
}

/// Canonical hexBinary form is upper-case.
#[must_use]
pub(crate) fn print_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

pub(crate) fn parse_base64(lexical: &str) -> Result<Vec<u8>, LexicalError> {
    // XML Schema permits whitespace inside base64 content.
    let compact: String = lexical.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|_| LexicalError::new("base64Binary", lexical))
}

#[must_use]
pub(crate) fn print_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let bytes = parse_hex("0aFF").unwrap();
        assert_eq!(bytes, vec![0x0a, 0xff]);
        assert_eq!(print_hex(&bytes), "0AFF");
        assert!(parse_hex("0a0").is_err());
    }

    #[test]
    fn test_base64_roundtrip() {
        let bytes = parse_base64("aGVsbG8=").unwrap();
        assert_eq!(bytes, b"hello");
        assert_eq!(print_base64(&bytes), "aGVsbG8=");
        assert!(parse_base64("not base64!").is_err());
    }
}
