//! Exact-key deduplication: the history union and the "already owned" join.
//!
//! Matching here is strictly on (artist_key, title_key). Fuzzy matching is
//! kept out of this step so a near-miss never hides a missing song.

use rustc_hash::FxHashSet;

use crate::models::{HistoryRow, LibraryEntry, TrackRecord};

/// Ownership of one history row against the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    Owned,
    Missing,
}

/// Set of composite keys present in the library.
#[derive(Debug, Default)]
pub struct OwnedIndex {
    keys: FxHashSet<(String, String)>,
}

impl OwnedIndex {
    pub fn new(library: &[LibraryEntry]) -> Self {
        let keys = library
            .iter()
            .map(|entry| {
                (
                    entry.track.artist_key().to_string(),
                    entry.track.title_key().to_string(),
                )
            })
            .collect();
        Self { keys }
    }

    pub fn classify(&self, track: &TrackRecord) -> Ownership {
        // Borrowed tuple lookup needs an owned key; keys are short
        let key = (track.artist_key().to_string(), track.title_key().to_string());
        if self.keys.contains(&key) {
            Ownership::Owned
        } else {
            Ownership::Missing
        }
    }
}

/// Concatenate history sets in order and keep the first row per composite key.
pub fn union_history(sets: &[&[HistoryRow]]) -> Vec<HistoryRow> {
    let mut seen: FxHashSet<(String, String)> = FxHashSet::default();
    let mut unique = Vec::new();
    for row in sets.iter().flat_map(|set| set.iter()) {
        let key = (
            row.track.artist_key().to_string(),
            row.track.title_key().to_string(),
        );
        if seen.insert(key) {
            unique.push(row.clone());
        }
    }
    unique
}

/// Left anti-join: history rows whose composite key is absent from the
/// library, in input order, duplicates removed.
pub fn find_missing(history: &[HistoryRow], library: &[LibraryEntry]) -> Vec<HistoryRow> {
    let owned = OwnedIndex::new(library);
    let mut seen: FxHashSet<(&str, &str)> = FxHashSet::default();
    let mut missing = Vec::new();
    for row in history {
        if owned.classify(&row.track) == Ownership::Missing && seen.insert(row.track.key()) {
            missing.push(row.clone());
        }
    }
    missing
}
