//! Tabular outputs: the recommendation list, the library snapshot, the rename
//! log, and the console preview of recommendations.

use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::loader::{ARTIST_COLUMN, FILE_COLUMN, SCROBBLES_COLUMN, TRACK_COLUMN};
use crate::models::{LibraryEntry, Recommendation, RenameLogEntry};
use crate::normalize::display_form;
use crate::renamer::RenameLogSink;

pub const RENAME_LOG_HEADER: [&str; 3] = ["Status", "Original Filename", "New Filename"];

fn create_output(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

// ============================================================================
// Recommendations
// ============================================================================

/// Write `Artist Name(s), Track Name, Scrobbles` rows in the given order.
/// A missing scrobble count is written as an empty cell.
pub fn write_recommendations<W: Write>(writer: W, recommendations: &[Recommendation]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([ARTIST_COLUMN, TRACK_COLUMN, SCROBBLES_COLUMN])?;
    for rec in recommendations {
        let count = rec.scrobble_count.map(|c| c.to_string()).unwrap_or_default();
        csv.write_record([rec.artist.as_str(), rec.title.as_str(), count.as_str()])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_recommendations(path: &Path, recommendations: &[Recommendation]) -> Result<()> {
    let file = create_output(path)?;
    write_recommendations(file, recommendations)
        .with_context(|| format!("Failed to write recommendations to {}", path.display()))
}

/// One preview line per recommendation: `- Artist — Title  (N scrobbles)`.
pub fn format_preview(recommendations: &[Recommendation]) -> Vec<String> {
    recommendations
        .iter()
        .map(|rec| {
            let count = rec
                .scrobble_count
                .map(|c| c.to_string())
                .unwrap_or_else(|| "?".to_string());
            format!(
                "- {} — {}  ({} scrobbles)",
                display_form(&rec.artist),
                display_form(&rec.title),
                count
            )
        })
        .collect()
}

pub fn print_preview(recommendations: &[Recommendation]) {
    println!("Top {} songs to learn:", recommendations.len());
    for line in format_preview(recommendations) {
        println!("{}", line);
    }
}

// ============================================================================
// Library Snapshot
// ============================================================================

/// Write `Artist Name(s), Track Name, file_name` rows.
pub fn write_library<W: Write>(writer: W, entries: &[LibraryEntry]) -> Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([ARTIST_COLUMN, TRACK_COLUMN, FILE_COLUMN])?;
    for entry in entries {
        csv.write_record([
            entry.track.artist(),
            entry.track.title(),
            entry.source_filename.as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(())
}

pub fn save_library(path: &Path, entries: &[LibraryEntry]) -> Result<()> {
    let file = create_output(path)?;
    write_library(file, entries).with_context(|| format!("Failed to write library to {}", path.display()))
}

// ============================================================================
// Rename Log
// ============================================================================

/// CSV rename log flushed after every entry.
pub struct CsvRenameLog<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> CsvRenameLog<W> {
    pub fn new(writer: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(writer);
        writer.write_record(RENAME_LOG_HEADER)?;
        writer.flush()?;
        Ok(Self { writer })
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| anyhow!("Failed to flush rename log: {}", e))
    }
}

impl CsvRenameLog<File> {
    pub fn create(path: &Path) -> Result<Self> {
        let file = create_output(path)?;
        Self::new(file).with_context(|| format!("Failed to start rename log {}", path.display()))
    }
}

impl<W: Write> RenameLogSink for CsvRenameLog<W> {
    fn append(&mut self, entry: &RenameLogEntry) -> Result<()> {
        self.writer
            .write_record([entry.status.as_str(), entry.original.as_str(), entry.new_name.as_str()])?;
        self.writer.flush().context("Failed to flush rename log")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RenameStatus, TrackRecord};

    fn rec(artist: &str, title: &str, count: Option<u64>) -> Recommendation {
        Recommendation {
            artist: artist.to_string(),
            title: title.to_string(),
            artist_key: crate::normalize::normalize_key(artist),
            scrobble_count: count,
        }
    }

    #[test]
    fn test_write_recommendations() {
        let mut out = Vec::new();
        write_recommendations(
            &mut out,
            &[rec("the strokes", "heart in a cage", Some(500)), rec("Blur", "Song 2, Live", None)],
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Artist Name(s),Track Name,Scrobbles\nthe strokes,heart in a cage,500\nBlur,\"Song 2, Live\",\n"
        );
    }

    #[test]
    fn test_format_preview() {
        let lines = format_preview(&[rec("the strokes", "heart in a cage", Some(500)), rec("muse", "uprising", None)]);
        assert_eq!(lines[0], "- The Strokes — Heart In A Cage  (500 scrobbles)");
        assert_eq!(lines[1], "- Muse — Uprising  (? scrobbles)");
    }

    #[test]
    fn test_write_library() {
        let mut out = Vec::new();
        let entries = vec![LibraryEntry {
            track: TrackRecord::new("The Strokes", "Reptilia"),
            source_filename: "The Strokes - Reptilia_p.psarc".to_string(),
        }];
        write_library(&mut out, &entries).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Artist Name(s),Track Name,file_name\nThe Strokes,Reptilia,The Strokes - Reptilia_p.psarc\n"
        );
    }

    #[test]
    fn test_rename_log_rows() {
        let mut log = CsvRenameLog::new(Vec::new()).unwrap();
        log.append(&RenameLogEntry::new(RenameStatus::SkippedDuplicate, "a.psarc", "A - B_p.psarc"))
            .unwrap();
        log.append(&RenameLogEntry::new(RenameStatus::NoMatch, "c.psarc", "")).unwrap();
        let text = String::from_utf8(log.into_inner().unwrap()).unwrap();
        assert_eq!(
            text,
            "Status,Original Filename,New Filename\nSKIPPED (duplicate),a.psarc,A - B_p.psarc\nNO MATCH,c.psarc,\n"
        );
    }

    #[test]
    fn test_rename_log_file_is_flushed_per_entry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("rename_log.csv");
        let mut log = CsvRenameLog::create(&path).unwrap();
        log.append(&RenameLogEntry::new(RenameStatus::Renamed, "x.psarc", "X - Y_p.psarc"))
            .unwrap();
        // Visible on disk before the log is dropped
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("RENAMED,x.psarc,X - Y_p.psarc\n"));
    }
}
