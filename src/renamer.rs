//! Filename normalization pass over a folder of malformed chart files.
//!
//! Every file gets exactly one log entry (plus a follow-up entry if its
//! rename fails). The entry is written to the sink before the filesystem is
//! touched, so an interrupted pass can be reconstructed from the log.
//! Targets are claimed per pass: two files matching the same reference give
//! one RENAMED and one SKIPPED (duplicate), never an overwrite.

use anyhow::{Context, Result};
use log::{info, warn};
use rustc_hash::FxHashSet;
use std::path::{Path, PathBuf};

use crate::filename::{canonical_filename, is_chart_file, unmatched_entry, with_packaging_marker};
use crate::fuzzy::{FuzzyMatch, ReferenceSet, MATCH_THRESHOLD};
use crate::models::{RenameLogEntry, RenameStatus, RenameSummary};
use crate::progress::{log_progress, pass_bar};

// ============================================================================
// Ports
// ============================================================================

/// Flat folder of chart files.
pub trait ChartFolder {
    /// File names (not paths) directly inside the folder.
    fn list_files(&self) -> Result<Vec<String>>;
    fn exists(&self, name: &str) -> bool;
    fn rename(&mut self, from: &str, to: &str) -> Result<()>;
}

/// Append-only destination for rename log entries.
pub trait RenameLogSink {
    /// Record one entry. Implementations must persist it before returning.
    fn append(&mut self, entry: &RenameLogEntry) -> Result<()>;
}

impl RenameLogSink for Vec<RenameLogEntry> {
    fn append(&mut self, entry: &RenameLogEntry) -> Result<()> {
        self.push(entry.clone());
        Ok(())
    }
}

/// A real directory on disk.
#[derive(Debug, Clone)]
pub struct DiskFolder {
    root: PathBuf,
}

impl DiskFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ChartFolder for DiskFolder {
    fn list_files(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let entries = std::fs::read_dir(&self.root)
            .with_context(|| format!("Failed to list folder {}", self.root.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("Failed to read entry in {}", self.root.display()))?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            match entry.file_name().into_string() {
                Ok(name) => names.push(name),
                Err(raw) => warn!("Skipping non-UTF-8 filename {:?}", raw),
            }
        }
        Ok(names)
    }

    /// Any directory entry counts, dangling symlinks included.
    fn exists(&self, name: &str) -> bool {
        std::fs::symlink_metadata(self.root.join(name)).is_ok()
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        let (src, dst) = (self.root.join(from), self.root.join(to));
        std::fs::rename(&src, &dst)
            .with_context(|| format!("Failed to rename {} -> {}", src.display(), dst.display()))
    }
}

// ============================================================================
// Normalization Pass
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct RenameOptions {
    pub threshold: u8,
    /// Log decisions without touching the folder
    pub dry_run: bool,
}

impl Default for RenameOptions {
    fn default() -> Self {
        Self {
            threshold: MATCH_THRESHOLD,
            dry_run: false,
        }
    }
}

/// Review line for one match decision: the cleaned guess, the best
/// reference and its score.
pub fn describe_match(guess: &str, outcome: &FuzzyMatch<'_>) -> String {
    match outcome {
        FuzzyMatch::Matched { reference, score } => {
            format!("Matching '{}' to '{}' (score: {})", guess, reference, score)
        }
        FuzzyMatch::NoMatch { best: Some((reference, score)) } => {
            format!("No match for '{}', best '{}' (score: {})", guess, reference, score)
        }
        FuzzyMatch::NoMatch { best: None } => format!("No match for '{}', no references", guess),
    }
}

fn record<S: RenameLogSink>(sink: &mut S, summary: &mut RenameSummary, entry: RenameLogEntry) -> Result<()> {
    match entry.status {
        RenameStatus::Renamed => info!("RENAMED {} -> {}", entry.original, entry.new_name),
        RenameStatus::SkippedDuplicate => info!("SKIPPED (duplicate) {} -> {}", entry.original, entry.new_name),
        RenameStatus::NoMatch => info!("NO MATCH {}", entry.original),
        RenameStatus::Unmatched => warn!("UNMATCHED {}", entry.original),
    }
    sink.append(&entry)?;
    summary.record(entry.status);
    Ok(())
}

/// Decide and apply the canonical name for every chart file in `folder`.
///
/// Files are visited in name order. Sink failures abort the pass (an
/// unlogged rename is not allowed); rename failures do not.
pub fn normalize_folder<F, S>(
    folder: &mut F,
    references: &ReferenceSet,
    options: RenameOptions,
    sink: &mut S,
) -> Result<RenameSummary>
where
    F: ChartFolder + ?Sized,
    S: RenameLogSink,
{
    let mut files: Vec<String> = folder.list_files()?.into_iter().filter(|n| is_chart_file(n)).collect();
    files.sort();
    info!(
        "Normalizing {} chart files against {} reference titles",
        files.len(),
        references.len()
    );

    let pb = pass_bar(files.len() as u64, "Normalizing filenames", "files");
    let mut claimed: FxHashSet<String> = FxHashSet::default();
    let mut summary = RenameSummary::default();

    for (i, name) in files.iter().enumerate() {
        pb.inc(1);
        log_progress("normalize", i as u64 + 1, files.len() as u64, 25);

        let file = unmatched_entry(name);
        if file.normalized_guess.is_empty() {
            record(sink, &mut summary, RenameLogEntry::new(RenameStatus::Unmatched, name, ""))?;
            continue;
        }

        let outcome = references.best_match(&file.normalized_guess, options.threshold);
        info!("{}: {}", name, describe_match(&file.normalized_guess, &outcome));
        let reference = match outcome {
            FuzzyMatch::Matched { reference, .. } => reference,
            FuzzyMatch::NoMatch { .. } => {
                record(sink, &mut summary, RenameLogEntry::new(RenameStatus::NoMatch, name, ""))?;
                continue;
            }
        };

        let target = canonical_filename(reference);
        if claimed.contains(&target) || folder.exists(&target) {
            record(sink, &mut summary, RenameLogEntry::new(RenameStatus::SkippedDuplicate, name, &target))?;
            continue;
        }
        claimed.insert(target.clone());

        record(sink, &mut summary, RenameLogEntry::new(RenameStatus::Renamed, name, &target))?;
        if options.dry_run {
            continue;
        }
        if let Err(e) = folder.rename(name, &target) {
            warn!("{:#}", e);
            sink.append(&RenameLogEntry::new(RenameStatus::Unmatched, name, &target))?;
            summary.renamed -= 1;
            summary.record(RenameStatus::Unmatched);
        }
    }

    pb.finish_and_clear();
    info!(
        "Normalization done: {} renamed, {} duplicates, {} no match, {} unmatched",
        summary.renamed, summary.skipped_duplicate, summary.no_match, summary.unmatched
    );
    Ok(summary)
}

/// Add the packaging marker to every chart file lacking it.
/// Existing targets are skipped and logged, never overwritten.
pub fn add_packaging_markers<F, S>(folder: &mut F, dry_run: bool, sink: &mut S) -> Result<RenameSummary>
where
    F: ChartFolder + ?Sized,
    S: RenameLogSink,
{
    let mut files = folder.list_files()?;
    files.sort();

    let pb = pass_bar(files.len() as u64, "Adding packaging markers", "files");
    let mut summary = RenameSummary::default();
    for (i, name) in files.iter().enumerate() {
        pb.inc(1);
        log_progress("add-suffix", i as u64 + 1, files.len() as u64, 50);
        let Some(target) = with_packaging_marker(name) else {
            continue;
        };
        if folder.exists(&target) {
            record(sink, &mut summary, RenameLogEntry::new(RenameStatus::SkippedDuplicate, name, &target))?;
            continue;
        }
        record(sink, &mut summary, RenameLogEntry::new(RenameStatus::Renamed, name, &target))?;
        if dry_run {
            continue;
        }
        if let Err(e) = folder.rename(name, &target) {
            warn!("{:#}", e);
            sink.append(&RenameLogEntry::new(RenameStatus::Unmatched, name, &target))?;
            summary.renamed -= 1;
            summary.record(RenameStatus::Unmatched);
        }
    }
    pb.finish_and_clear();
    Ok(summary)
}
