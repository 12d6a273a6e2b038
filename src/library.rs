//! Library rebuild: walk the chart folder and turn every chart filename into
//! a library entry.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::path::Path;
use walkdir::WalkDir;

use crate::filename::{is_chart_file, parse_library_filename};
use crate::models::{LibraryEntry, TrackRecord};

/// Result of a library scan.
#[derive(Debug, Clone, Default)]
pub struct LibraryScan {
    pub entries: Vec<LibraryEntry>,
    /// Chart filenames that did not yield both an artist and a title
    pub rejected: Vec<String>,
}

/// Parse chart filenames into library entries, in input order.
pub fn entries_from_filenames<I, S>(names: I) -> LibraryScan
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut scan = LibraryScan::default();
    for name in names {
        let name = name.as_ref();
        match parse_library_filename(name) {
            Some((artist, title)) => scan.entries.push(LibraryEntry {
                track: TrackRecord::new(artist, title),
                source_filename: name.to_string(),
            }),
            None => {
                warn!("Dropping library file {}: no artist/title", name);
                scan.rejected.push(name.to_string());
            }
        }
    }
    scan
}

/// Recursively collect chart files under `root`, skipping the `exclude`
/// subtree (the normalizer workspace). Files are returned sorted by path.
pub fn scan_library(root: &Path, exclude: Option<&Path>) -> Result<LibraryScan> {
    if !root.is_dir() {
        anyhow::bail!("Chart folder {} does not exist", root.display());
    }

    let mut names = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| exclude.map_or(true, |ex| e.path() != ex));
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            warn!("Skipping non-UTF-8 path {}", entry.path().display());
            continue;
        };
        if is_chart_file(name) {
            debug!("Found chart {}", entry.path().display());
            names.push(name.to_string());
        }
    }

    let scan = entries_from_filenames(&names);
    info!(
        "Scanned {}: {} charts, {} rejected",
        root.display(),
        scan.entries.len(),
        scan.rejected.len()
    );
    Ok(scan)
}
