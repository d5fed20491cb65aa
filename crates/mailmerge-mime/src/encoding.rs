//! MIME encoding utilities.
//!
//! Supports Base64, Quoted-Printable, and RFC 2047 header encoding.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::fmt::Write as _;

/// Maximum line length for encoded body lines (RFC 2045).
const MAX_LINE_LENGTH: usize = 76;

/// Bytes of UTF-8 text per RFC 2047 encoded word, keeping each word under
/// 75 characters once base64-encoded and wrapped.
const ENCODED_WORD_CHUNK: usize = 45;

/// Encodes data as Base64.
#[must_use]
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as Base64 split into CRLF-terminated lines of 76 characters.
#[must_use]
pub fn encode_base64_wrapped(data: &[u8]) -> String {
    let encoded = encode_base64(data);
    let mut result = String::with_capacity(encoded.len() + encoded.len() / MAX_LINE_LENGTH * 2 + 2);
    for chunk in encoded.as_bytes().chunks(MAX_LINE_LENGTH) {
        // Base64 output is pure ASCII.
        result.push_str(&String::from_utf8_lossy(chunk));
        result.push_str("\r\n");
    }
    result
}

/// Encodes text using Quoted-Printable encoding (RFC 2045).
///
/// Hard line breaks (`\n` or `\r\n`) are kept as CRLF, trailing whitespace
/// on a line is encoded, and long lines get soft breaks so that no output
/// line exceeds 76 characters.
#[must_use]
pub fn encode_quoted_printable(text: &str) -> String {
    let mut result = String::with_capacity(text.len() + text.len() / 8);

    let body = text.strip_suffix('\n').unwrap_or(text);
    for (index, line) in body.split('\n').enumerate() {
        if index > 0 {
            result.push_str("\r\n");
        }
        let line = line.strip_suffix('\r').unwrap_or(line);
        encode_qp_line(line.as_bytes(), &mut result);
    }
    if text.ends_with('\n') {
        result.push_str("\r\n");
    }

    result
}

fn encode_qp_line(line: &[u8], out: &mut String) {
    let mut line_length = 0;

    for (i, byte) in line.iter().enumerate() {
        let is_last = i + 1 == line.len();
        let mut token = String::with_capacity(3);
        match byte {
            b' ' | b'\t' if !is_last => token.push(char::from(*byte)),
            b'!'..=b'<' | b'>'..=b'~' => token.push(char::from(*byte)),
            _ => {
                let _ = write!(token, "={byte:02X}");
            }
        }

        // Leave room for the soft break marker.
        if line_length + token.len() > MAX_LINE_LENGTH - 1 {
            out.push_str("=\r\n");
            line_length = 0;
        }
        out.push_str(&token);
        line_length += token.len();
    }
}

/// Encodes a header value using RFC 2047 if it contains non-ASCII text.
///
/// Long values are split into several encoded words separated by a space,
/// each covering whole characters.
#[must_use]
pub fn encode_rfc2047(text: &str, charset: &str) -> String {
    if text.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) && !text.contains("=?") {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut chunk = String::new();
    for c in text.chars() {
        if chunk.len() + c.len_utf8() > ENCODED_WORD_CHUNK {
            words.push(format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())));
            chunk.clear();
        }
        chunk.push(c);
    }
    if !chunk.is_empty() {
        words.push(format!("=?{charset}?B?{}?=", encode_base64(chunk.as_bytes())));
    }

    words.join(" ")
}
