//! Repair of UTF-8 text that was decoded as Latin-1 ("mojibake").
//!
//! The scrobble export is the one source known to arrive double-encoded:
//! "Beyoncé" shows up as "BeyoncÃ©". Repair re-encodes every character as a
//! single Latin-1 byte and decodes the bytes as UTF-8. It is best-effort and
//! never fails; text that cannot round-trip is returned untouched.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

/// When to apply mojibake repair to a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RepairMode {
    /// Never touch the text.
    Off,
    /// Repair only text that carries a mis-decoded UTF-8 byte sequence.
    #[default]
    Detect,
    /// Attempt the round-trip on every value.
    Always,
}

/// Re-encode as Latin-1 and decode as UTF-8.
///
/// Returns the original text when a character lies outside Latin-1 or when
/// the resulting bytes are not valid UTF-8.
pub fn repair_mojibake(text: &str) -> Cow<'_, str> {
    let mut bytes = Vec::with_capacity(text.len());
    for c in text.chars() {
        match u8::try_from(u32::from(c)) {
            Ok(b) => bytes.push(b),
            Err(_) => return Cow::Borrowed(text),
        }
    }
    match String::from_utf8(bytes) {
        Ok(fixed) if fixed != text => Cow::Owned(fixed),
        _ => Cow::Borrowed(text),
    }
}

/// Whether the text contains a Latin-1 rendering of a UTF-8 multi-byte
/// sequence: a lead byte (U+00C2..U+00F4) immediately followed by a
/// continuation byte (U+0080..U+00BF).
pub fn looks_mojibaked(text: &str) -> bool {
    let mut prev_lead = false;
    for c in text.chars() {
        let cp = u32::from(c);
        if prev_lead && (0x80..=0xBF).contains(&cp) {
            return true;
        }
        prev_lead = (0xC2..=0xF4).contains(&cp);
    }
    false
}

/// Apply repair according to `mode`.
pub fn apply_repair(text: &str, mode: RepairMode) -> Cow<'_, str> {
    match mode {
        RepairMode::Off => Cow::Borrowed(text),
        RepairMode::Detect if !looks_mojibaked(text) => Cow::Borrowed(text),
        RepairMode::Detect | RepairMode::Always => repair_mojibake(text),
    }
}

/// Decode raw file bytes. Valid UTF-8 (with or without BOM) is taken as is;
/// anything else is read as Latin-1, one character per byte.
pub fn decode_source_bytes(bytes: &[u8]) -> String {
    let body = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    match std::str::from_utf8(body) {
        Ok(s) => s.to_string(),
        Err(_) => body.iter().map(|&b| char::from(b)).collect(),
    }
}
