//! Approximate title matching for filename recovery.
//!
//! Candidates and references are cleaned with [`clean_for_match`], their
//! tokens sorted, and compared with an Indel similarity ratio. Only the best
//! reference at or above the threshold is accepted.

use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashSet;

use crate::models::TrackRecord;
use crate::normalize::clean_for_match;

/// Minimum token-sort score (0-100) for a match to be accepted.
pub const MATCH_THRESHOLD: u8 = 80;

// ============================================================================
// Title Fluff
// ============================================================================

/// Release qualifiers in parentheses: "(Remastered)", "(Deluxe)", "(Version 2)"
static PAREN_FLUFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*\((remastered|deluxe|explicit|version.*?)\)").unwrap()
});

/// The same qualifiers as a trailing " - Remastered" suffix
static DASH_FLUFF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s*-\s*(remastered|deluxe|explicit|version.*?)$").unwrap()
});

/// Remove release qualifiers from a reference title.
///
/// The dash form only applies after the "Artist - " separator, so a title
/// that itself starts with a qualifier word ("X - Version Control") survives.
pub fn strip_title_fluff(title: &str) -> String {
    let without_parens = PAREN_FLUFF.replace_all(title, "");
    let cleaned = match without_parens.split_once(" - ") {
        Some((artist, rest)) => format!("{} - {}", artist, DASH_FLUFF.replace_all(rest, "")),
        None => without_parens.to_string(),
    };
    cleaned.trim().to_string()
}

// ============================================================================
// Scoring
// ============================================================================

/// Length of the longest common subsequence of two char slices.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Normalized Indel similarity, 0-100. Two empty strings score 0.
pub fn indel_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 0;
    }
    let ratio = 200.0 * lcs_len(&a, &b) as f64 / total as f64;
    ratio.round() as u8
}

/// Whitespace tokens sorted and re-joined with single spaces.
fn sorted_tokens(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Word-order-insensitive similarity of two raw strings.
pub fn token_sort_ratio(a: &str, b: &str) -> u8 {
    indel_ratio(
        &sorted_tokens(&clean_for_match(a)),
        &sorted_tokens(&clean_for_match(b)),
    )
}

// ============================================================================
// Reference Set
// ============================================================================

#[derive(Debug, Clone)]
struct Reference {
    title: String,
    match_form: String,
}

/// Canonical "Artist - Title" strings in insertion order, each kept once.
#[derive(Debug, Clone, Default)]
pub struct ReferenceSet {
    references: Vec<Reference>,
    seen: FxHashSet<String>,
}

impl ReferenceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tracks<'a>(tracks: impl IntoIterator<Item = &'a TrackRecord>) -> Self {
        let mut set = Self::new();
        for track in tracks {
            set.insert_track(track);
        }
        set
    }

    pub fn insert_track(&mut self, track: &TrackRecord) -> bool {
        self.insert(&track.reference_title())
    }

    /// Add a reference title after fluff removal. Returns false if it was
    /// already present or is blank.
    pub fn insert(&mut self, title: &str) -> bool {
        let title = strip_title_fluff(title);
        if title.is_empty() || !self.seen.insert(title.clone()) {
            return false;
        }
        let match_form = sorted_tokens(&clean_for_match(&title));
        self.references.push(Reference { title, match_form });
        true
    }

    pub fn len(&self) -> usize {
        self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.references.is_empty()
    }

    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.references.iter().map(|r| r.title.as_str())
    }

    /// Best reference for `candidate`. Earliest inserted wins ties.
    pub fn best_match(&self, candidate: &str, threshold: u8) -> FuzzyMatch<'_> {
        let candidate = sorted_tokens(&clean_for_match(candidate));

        let mut best: Option<(&str, u8)> = None;
        for reference in &self.references {
            let score = indel_ratio(&candidate, &reference.match_form);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((reference.title.as_str(), score));
            }
        }

        match best {
            Some((reference, score)) if score >= threshold => FuzzyMatch::Matched { reference, score },
            _ => FuzzyMatch::NoMatch { best },
        }
    }
}

/// Outcome of [`ReferenceSet::best_match`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuzzyMatch<'a> {
    Matched { reference: &'a str, score: u8 },
    /// Nothing reached the threshold; `best` is the closest reference, if any
    NoMatch { best: Option<(&'a str, u8)> },
}

impl FuzzyMatch<'_> {
    pub fn is_match(&self) -> bool {
        matches!(self, FuzzyMatch::Matched { .. })
    }
}
