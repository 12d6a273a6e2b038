//! Shared normalization functions for library/history reconciliation.
//! Used by the loader, the dedup join, and the filename matcher.
//!
//! CRITICAL: `normalize_key` defines what "already owned" means. Any change
//! here changes which songs are reported missing. Run tests after changes.

use once_cell::sync::Lazy;
use regex::Regex;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Everything that is not a lower-case ASCII letter or digit.
/// Applied after lower-casing, so upper-case letters never reach it.
pub static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]").unwrap());

/// Regex to collapse runs of whitespace into a single space
pub static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// Build the comparison key for an artist or track name.
///
/// Lower-cases, spells out `&` as `and`, then drops every character that is
/// not `a-z` or `0-9`. Whitespace, punctuation and accented letters are
/// removed outright, so "Blink-182", "blink_182" and "BLINK 182" share a key.
pub fn normalize_key(text: &str) -> String {
    let lowered = text.to_lowercase().replace('&', "and");
    NON_ALNUM.replace_all(&lowered, "").into_owned()
}

/// Key for a cell that may be absent (empty CSV field). Absent maps to "".
pub fn normalize_key_opt(text: Option<&str>) -> String {
    text.map(normalize_key).unwrap_or_default()
}

/// Title-case a string the way Python's `str.title()` does: a letter is
/// upper-cased when the character before it is not a letter, lower-cased
/// otherwise. "don't stop" becomes "Don'T Stop", "ac/dc" becomes "Ac/Dc".
pub fn title_case(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_cased = false;
    for c in text.chars() {
        let cased = c.is_lowercase() || c.is_uppercase();
        if cased {
            if prev_cased {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
        } else {
            out.push(c);
        }
        prev_cased = cased;
    }
    out
}

/// Display form of a raw name: whitespace collapsed, then title-cased.
pub fn display_form(text: &str) -> String {
    title_case(MULTI_SPACE.replace_all(text.trim(), " ").as_ref())
}

/// Stricter cleaning used only at fuzzy-match time.
///
/// Lower-cases, deletes ASCII punctuation (it is not replaced by a space, so
/// "Guns N' Roses" becomes "guns n roses") and collapses whitespace.
pub fn clean_for_match(text: &str) -> String {
    let stripped: String = text
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_ascii_punctuation())
        .collect();
    MULTI_SPACE.replace_all(stripped.trim(), " ").into_owned()
}

// ============================================================================
// TESTS
// ============================================================================
