//! Chart filename handling: recognising chart files, cleaning malformed names
//! into match candidates, parsing library filenames, and formatting the
//! canonical `Artist - Title_p.psarc` form.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::UnmatchedFilename;
use crate::normalize::{title_case, MULTI_SPACE};

/// Chart file extension, compared case-insensitively.
pub const CHART_EXTENSION: &str = ".psarc";

/// Trailing marker on a chart file stem.
pub const PACKAGING_MARKER: &str = "_p";

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Dotted version numbers ("v1.2", "V3.1.4") and the "RS2014" tag, anywhere.
/// These can be glued to other words ("Luckyv1.0RS2014") so they go first.
static GLUED_VERSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)v\d+(\.\d+)+|rs2014").unwrap());

/// Separators between words in a malformed filename.
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-_.\s]+").unwrap());

/// Whole tokens that carry no artist/title information.
static NOISE_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^(v\d+|ver\d+|dd|rs|rs2014|remaster|remastered|deluxe|explicit|lead|rhythm|bass|combo|alt\d+|part\d+|psarc)$",
    )
    .unwrap()
});

/// Version, variant and part qualifiers in a library filename.
/// `alt`/`part` need a number so band names like "Alt-J" survive.
static LIBRARY_QUALIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:(?:v|ver|rs2014|remastered|explicit|deluxe|lead|rhythm|combo)\d*|(?:alt|part)\d+)(?:\.\d+)*\b",
    )
    .unwrap()
});

static BRACKETS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\[\](){}]").unwrap());

/// Characters not allowed in filenames on the platforms charts live on.
const UNSAFE_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

// ============================================================================
// FILENAME FUNCTIONS
// ============================================================================

pub fn is_chart_file(name: &str) -> bool {
    name.to_lowercase().ends_with(CHART_EXTENSION)
}

fn strip_suffix_ignore_case<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    if !text.is_char_boundary(split) {
        return None;
    }
    let (head, tail) = text.split_at(split);
    tail.eq_ignore_ascii_case(suffix).then_some(head)
}

/// True when the stem already ends in the packaging marker.
pub fn has_packaging_marker(name: &str) -> bool {
    let stem = strip_suffix_ignore_case(name, CHART_EXTENSION).unwrap_or(name);
    strip_suffix_ignore_case(stem, PACKAGING_MARKER).is_some()
}

/// Drop the chart extension and a trailing packaging marker.
pub fn strip_packaging(name: &str) -> &str {
    let stem = strip_suffix_ignore_case(name, CHART_EXTENSION).unwrap_or(name);
    strip_suffix_ignore_case(stem, PACKAGING_MARKER).unwrap_or(stem)
}

/// Clean a malformed chart filename into a title-cased match candidate.
///
/// "The.Strokes-Reptilia_v2_RS.psarc" becomes "The Strokes Reptilia".
/// Returns an empty string when nothing but noise remains.
pub fn candidate_title(name: &str) -> String {
    let stem = GLUED_VERSION.replace_all(strip_packaging(name), " ");
    let words: Vec<&str> = SEPARATORS
        .split(&stem)
        .filter(|token| !token.is_empty() && !NOISE_TOKEN.is_match(token))
        .collect();
    title_case(&words.join(" "))
}

/// Pair a raw chart filename with its cleaned match candidate.
pub fn unmatched_entry(name: &str) -> UnmatchedFilename {
    UnmatchedFilename {
        raw_filename: name.to_string(),
        normalized_guess: candidate_title(name),
    }
}

/// Parse a library chart filename into a title-cased (artist, title) pair.
///
/// Splits on the first " - "; without one, the first word is the artist.
/// Returns `None` when fewer than two name segments remain.
pub fn parse_library_filename(name: &str) -> Option<(String, String)> {
    let stem = strip_packaging(name).replace('_', " ");
    let stem = LIBRARY_QUALIFIER.replace_all(&stem, "");
    let stem = BRACKETS.replace_all(&stem, "");
    let stem = MULTI_SPACE.replace_all(stem.trim(), " ");

    let (artist, title) = match stem.split_once(" - ") {
        Some(parts) => parts,
        None => stem.split_once(' ')?,
    };
    let (artist, title) = (artist.trim(), title.trim());
    if artist.is_empty() || title.is_empty() {
        return None;
    }
    Some((title_case(artist), title_case(title)))
}

/// Replace filesystem-unsafe characters with a hyphen.
pub fn sanitize_component(text: &str) -> String {
    text.chars()
        .map(|c| if UNSAFE_CHARS.contains(&c) { '-' } else { c })
        .collect()
}

/// `"<Artist> - <Title>_p.psarc"` for a matched reference title.
pub fn canonical_filename(reference: &str) -> String {
    let stem = sanitize_component(reference.trim());
    if strip_suffix_ignore_case(&stem, PACKAGING_MARKER).is_some() {
        format!("{}{}", stem, CHART_EXTENSION)
    } else {
        format!("{}{}{}", stem, PACKAGING_MARKER, CHART_EXTENSION)
    }
}

/// Name with the packaging marker added, or `None` if it already has one or
/// is not a chart file.
pub fn with_packaging_marker(name: &str) -> Option<String> {
    if !is_chart_file(name) || has_packaging_marker(name) {
        return None;
    }
    let stem = strip_suffix_ignore_case(name, CHART_EXTENSION)?;
    Some(format!("{}{}{}", stem, PACKAGING_MARKER, CHART_EXTENSION))
}

// ============================================================================
// TESTS
// ============================================================================
