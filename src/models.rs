//! Core data models for library/history reconciliation.
//!
//! This module contains the record types that flow between the loader,
//! the dedup join, the ranker and the filename matcher, plus the run
//! statistics emitted at the end of each command.

use serde::Serialize;
use std::fmt;

use crate::normalize::normalize_key;

// ============================================================================
// Track Records
// ============================================================================

/// Artist/title pair with derived comparison keys.
///
/// Keys are computed once from the display strings and cannot be set
/// directly, so `artist_key == normalize_key(artist)` always holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackRecord {
    artist: String,
    title: String,
    artist_key: String,
    title_key: String,
}

impl TrackRecord {
    pub fn new(artist: impl Into<String>, title: impl Into<String>) -> Self {
        let artist = artist.into();
        let title = title.into();
        Self {
            artist_key: normalize_key(&artist),
            title_key: normalize_key(&title),
            artist,
            title,
        }
    }

    pub fn artist(&self) -> &str {
        &self.artist
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn artist_key(&self) -> &str {
        &self.artist_key
    }

    pub fn title_key(&self) -> &str {
        &self.title_key
    }

    /// Composite join key (artist_key, title_key)
    pub fn key(&self) -> (&str, &str) {
        (&self.artist_key, &self.title_key)
    }

    /// "Artist - Title" form used by the filename matcher
    pub fn reference_title(&self) -> String {
        format!("{} - {}", self.artist.trim(), self.title.trim())
    }
}

/// A chart the user already owns, parsed from its filename.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryEntry {
    pub track: TrackRecord,
    pub source_filename: String,
}

/// Which listening-history export a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Liked,
    Top,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Origin::Liked => f.write_str("liked"),
            Origin::Top => f.write_str("top"),
        }
    }
}

/// A liked or top track from the listening history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryRow {
    pub track: TrackRecord,
    pub origin: Origin,
}

/// Per-artist popularity from the scrobble export.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtistPriority {
    pub artist: String,
    pub artist_key: String,
    pub scrobble_count: u64,
}

impl ArtistPriority {
    pub fn new(artist: impl Into<String>, scrobble_count: u64) -> Self {
        let artist = artist.into();
        Self {
            artist_key: normalize_key(&artist),
            artist,
            scrobble_count,
        }
    }
}

/// Missing song with its artist's scrobble count.
/// `scrobble_count == None` means the artist has no (in-range) scrobble record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recommendation {
    pub artist: String,
    pub title: String,
    pub artist_key: String,
    pub scrobble_count: Option<u64>,
}

// ============================================================================
// Filename Recovery
// ============================================================================

/// Chart file whose name could not be exact-joined, with its cleaned guess.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnmatchedFilename {
    pub raw_filename: String,
    pub normalized_guess: String,
}

/// Outcome of one file in a rename pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RenameStatus {
    Renamed,
    SkippedDuplicate,
    Unmatched,
    NoMatch,
}

impl RenameStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenameStatus::Renamed => "RENAMED",
            RenameStatus::SkippedDuplicate => "SKIPPED (duplicate)",
            RenameStatus::Unmatched => "UNMATCHED",
            RenameStatus::NoMatch => "NO MATCH",
        }
    }
}

impl fmt::Display for RenameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the rename log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenameLogEntry {
    pub status: RenameStatus,
    pub original: String,
    /// Target filename; empty when nothing was proposed
    pub new_name: String,
}

impl RenameLogEntry {
    pub fn new(status: RenameStatus, original: impl Into<String>, new_name: impl Into<String>) -> Self {
        Self {
            status,
            original: original.into(),
            new_name: new_name.into(),
        }
    }
}

// ============================================================================
// Statistics (Instrumentation)
// ============================================================================

/// Per-phase counts for a reconciliation run.
#[derive(Default, Debug, Clone, Serialize)]
pub struct ReconcileStats {
    // Loading
    pub library_rows: usize,
    pub liked_rows: usize,
    pub top_rows: usize,
    pub scrobble_rows: usize,
    pub scrobble_rows_dropped: usize,
    pub scrobble_rows_repaired: usize,

    // Matching
    pub history_unique: usize,
    pub owned: usize,
    pub missing: usize,

    // Ranking
    pub priority_artists_in_range: usize,
    pub ranked_with_count: usize,
    pub ranked_without_count: usize,

    // Existence filter
    pub oracle_checks: usize,
    pub oracle_confirmed: usize,

    // Output
    pub recommendations: usize,

    // Timing
    pub elapsed_seconds: f64,
}

impl ReconcileStats {
    /// Share of unique history rows already in the library, as a percentage
    pub fn owned_rate(&self) -> f64 {
        if self.history_unique == 0 {
            0.0
        } else {
            100.0 * self.owned as f64 / self.history_unique as f64
        }
    }

    /// Log stats to stderr in JSON format
    pub fn log_phase(&self, phase: &str) {
        if let Ok(json) = serde_json::to_string_pretty(self) {
            eprintln!("[STATS:{}]\n{}", phase, json);
        }
    }

    /// Write stats to a JSON file
    pub fn write_to_file(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Per-status counts for a rename pass.
#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameSummary {
    pub renamed: usize,
    pub skipped_duplicate: usize,
    pub unmatched: usize,
    pub no_match: usize,
}

impl RenameSummary {
    pub fn record(&mut self, status: RenameStatus) {
        match status {
            RenameStatus::Renamed => self.renamed += 1,
            RenameStatus::SkippedDuplicate => self.skipped_duplicate += 1,
            RenameStatus::Unmatched => self.unmatched += 1,
            RenameStatus::NoMatch => self.no_match += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.renamed + self.skipped_duplicate + self.unmatched + self.no_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_record_keys_follow_display() {
        let track = TrackRecord::new("The Strokes", "Heart In A Cage");
        assert_eq!(track.artist_key(), "thestrokes");
        assert_eq!(track.title_key(), "heartinacage");
        assert_eq!(track.key(), ("thestrokes", "heartinacage"));
    }

    #[test]
    fn test_reference_title() {
        let track = TrackRecord::new(" Queen ", "Bohemian Rhapsody ");
        assert_eq!(track.reference_title(), "Queen - Bohemian Rhapsody");
    }

    #[test]
    fn test_rename_status_labels() {
        assert_eq!(RenameStatus::Renamed.to_string(), "RENAMED");
        assert_eq!(RenameStatus::SkippedDuplicate.to_string(), "SKIPPED (duplicate)");
        assert_eq!(RenameStatus::Unmatched.to_string(), "UNMATCHED");
        assert_eq!(RenameStatus::NoMatch.to_string(), "NO MATCH");
    }

    #[test]
    fn test_rename_summary_counts() {
        let mut summary = RenameSummary::default();
        summary.record(RenameStatus::Renamed);
        summary.record(RenameStatus::SkippedDuplicate);
        summary.record(RenameStatus::NoMatch);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.renamed, 1);
    }

    #[test]
    fn test_owned_rate() {
        let stats = ReconcileStats {
            history_unique: 4,
            owned: 1,
            ..Default::default()
        };
        assert!((stats.owned_rate() - 25.0).abs() < f64::EPSILON);
        assert_eq!(ReconcileStats::default().owned_rate(), 0.0);
    }
}
