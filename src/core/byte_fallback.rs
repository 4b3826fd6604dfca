//! Byte fallback tokens.
//!
//! Text that no vocabulary entry covers is spelled out one UTF-8 byte at a
//! time as `<0xHH>` tokens, where `HH` is the byte in two uppercase hex
//! digits. A vocabulary that defines all 256 of these tokens can encode any
//! input.
//!
//! # Example
//!
//! ```
//! use trietok::byte_fallback::{byte_token, parse_byte_token};
//!
//! assert_eq!(byte_token(0xF0), "<0xF0>");
//! assert_eq!(parse_byte_token("<0xF0>"), Some(0xF0));
//! assert_eq!(parse_byte_token("<0xf0>"), None);
//! ```

use std::sync::LazyLock;

/// Byte to fallback token table (256 entries).
static BYTE_TOKENS: LazyLock<[String; 256]> =
    LazyLock::new(|| std::array::from_fn(|b| format!("<0x{:02X}>", b)));

const PREFIX: &str = "<0x";
const TOKEN_LEN: usize = 6;

/// The fallback token for `byte`.
#[inline]
pub fn byte_token(byte: u8) -> &'static str {
    &BYTE_TOKENS[byte as usize]
}

/// Parse a fallback token back to its byte.
///
/// Only the exact shape `<0xHH>` with uppercase hex digits is accepted;
/// anything else is an ordinary token.
pub fn parse_byte_token(token: &str) -> Option<u8> {
    if token.len() != TOKEN_LEN || !token.starts_with(PREFIX) || !token.ends_with('>') {
        return None;
    }
    let hex = &token.as_bytes()[PREFIX.len()..TOKEN_LEN - 1];
    let high = upper_hex_value(hex[0])?;
    let low = upper_hex_value(hex[1])?;
    Some((high << 4) | low)
}

#[inline]
fn upper_hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

/// Check whether `token` is a fallback token.
#[inline]
pub fn is_byte_token(token: &str) -> bool {
    parse_byte_token(token).is_some()
}

/// Append one fallback token per UTF-8 byte of `text` to `out`.
pub fn encode_fallback(text: &str, out: &mut Vec<String>) {
    out.extend(text.bytes().map(|b| byte_token(b).to_string()));
}

/// Reassemble a token sequence into text.
///
/// Each maximal run of fallback tokens is decoded as one UTF-8 byte string,
/// with invalid or truncated sequences replaced by U+FFFD. Other tokens are
/// appended verbatim.
pub fn join_tokens<S: AsRef<str>>(tokens: &[S]) -> String {
    let mut text = String::new();
    let mut run = Vec::new();

    for token in tokens {
        let token = token.as_ref();
        match parse_byte_token(token) {
            Some(byte) => run.push(byte),
            None => {
                flush_run(&mut run, &mut text);
                text.push_str(token);
            }
        }
    }
    flush_run(&mut run, &mut text);

    text
}

/// Decode a pending byte run into `text` and clear it.
pub(crate) fn flush_run(run: &mut Vec<u8>, text: &mut String) {
    if !run.is_empty() {
        text.push_str(&String::from_utf8_lossy(run));
        run.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_token_format() {
        assert_eq!(byte_token(0x00), "<0x00>");
        assert_eq!(byte_token(0x0A), "<0x0A>");
        assert_eq!(byte_token(0xFF), "<0xFF>");
    }

    #[test]
    fn test_parse_every_byte() {
        for b in 0u8..=255 {
            assert_eq!(parse_byte_token(byte_token(b)), Some(b));
        }
    }

    #[test]
    fn test_parse_rejects_other_shapes() {
        for token in ["<0xf0>", "<0xF>", "<0xF00>", "0xF0", "<0xG0>", "<0xF0", "<1xF0>", ""] {
            assert_eq!(parse_byte_token(token), None, "{:?}", token);
        }
        assert!(!is_byte_token("Hello"));
    }

    #[test]
    fn test_encode_fallback_emoji() {
        let mut out = Vec::new();
        encode_fallback("🍺", &mut out);
        assert_eq!(out, vec!["<0xF0>", "<0x9F>", "<0x8D>", "<0xBA>"]);
    }

    #[test]
    fn test_join_tokens_groups_runs() {
        let tokens = ["this", " is", " beer", ":", " ", "<0xF0>", "<0x9F>", "<0x8D>", "<0xBA>"];
        assert_eq!(join_tokens(&tokens), "this is beer: 🍺");
    }

    #[test]
    fn test_join_tokens_runs_do_not_span_ordinary_tokens() {
        // Two halves of "é" split by an ordinary token decode separately.
        let tokens = ["<0xC3>", "x", "<0xA9>"];
        assert_eq!(join_tokens(&tokens), "\u{FFFD}x\u{FFFD}");
    }

    #[test]
    fn test_join_tokens_truncated_run() {
        let tokens = ["a", "<0xE4>", "<0xB8>"];
        assert_eq!(join_tokens(&tokens), "a\u{FFFD}");
    }
}
