//! The `%XX` escaping scheme for foreign localparts.
//!
//! Encoding rule (fixed, applied identically by every server):
//!
//! - Bytes in `[a-z0-9._-]` pass through unchanged.
//! - Every other byte of the UTF-8 encoding — including `%` itself —
//!   becomes `%XX` with uppercase hex digits.
//!
//! Decoding is the exact inverse and is *strict*: escapes must be
//! uppercase hex, and an escape whose decoded byte is in the pass-through
//! set is rejected as non-canonical. Strictness keeps the mapping
//! injective — each native localpart has exactly one foreign form and
//! vice versa, so translated identifiers stay usable in equality checks.

use crate::mapper::MapError;

/// Whether a byte passes through the foreign localpart charset unescaped.
fn is_foreign_safe(byte: u8) -> bool {
    byte.is_ascii_lowercase()
        || byte.is_ascii_digit()
        || byte == b'.'
        || byte == b'_'
        || byte == b'-'
}

/// Escapes a native localpart into its foreign form.
pub fn escape_localpart(localpart: &str) -> String {
    let mut out = String::with_capacity(localpart.len());
    for byte in localpart.bytes() {
        if is_foreign_safe(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Unescapes a foreign localpart back into its native form.
///
/// # Errors
///
/// Returns [`MapError::MalformedIdentifier`] if the input contains a byte
/// outside the foreign charset, a truncated or non-uppercase-hex escape,
/// a non-canonical escape of a pass-through byte, or decodes to invalid
/// UTF-8.
pub fn unescape_localpart(foreign: &str) -> Result<String, MapError> {
    let bytes = foreign.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte == b'%' {
            let hi = bytes.get(i + 1).copied();
            let lo = bytes.get(i + 2).copied();
            let (hi, lo) = match (hi.and_then(hex_value), lo.and_then(hex_value)) {
                (Some(hi), Some(lo)) => (hi, lo),
                _ => {
                    return Err(MapError::MalformedIdentifier(format!(
                        "truncated or invalid escape at byte {i} in '{foreign}'"
                    )))
                }
            };
            let decoded = (hi << 4) | lo;
            if is_foreign_safe(decoded) {
                return Err(MapError::MalformedIdentifier(format!(
                    "non-canonical escape %{:02X} of a pass-through byte in '{foreign}'",
                    decoded
                )));
            }
            out.push(decoded);
            i += 3;
        } else if is_foreign_safe(byte) {
            out.push(byte);
            i += 1;
        } else {
            return Err(MapError::MalformedIdentifier(format!(
                "byte '{}' is outside the foreign localpart charset in '{foreign}'",
                byte as char
            )));
        }
    }

    String::from_utf8(out).map_err(|_| {
        MapError::MalformedIdentifier(format!("'{foreign}' decodes to invalid UTF-8"))
    })
}

/// Uppercase-hex digit value. Lowercase hex is rejected to keep the
/// encoding canonical.
fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}
