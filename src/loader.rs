//! Source loading: the owned library, the two listening-history exports and
//! the artist scrobble export, read into uniform record collections.
//!
//! Any missing file, unreadable file or missing column aborts the whole run.
//! Row-level problems (an unparseable scrobble count, an empty row) drop that
//! row only.

use anyhow::{bail, Context, Result};
use log::{debug, info};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::encoding::{apply_repair, decode_source_bytes, RepairMode};
use crate::models::{ArtistPriority, HistoryRow, LibraryEntry, Origin, TrackRecord};

// ============================================================================
// Column Names
// ============================================================================

pub const ARTIST_COLUMN: &str = "Artist Name(s)";
pub const TRACK_COLUMN: &str = "Track Name";
pub const FILE_COLUMN: &str = "file_name";
pub const SCROBBLES_COLUMN: &str = "Scrobbles";

/// Accepted header spellings per logical column: (canonical, alias)
const ARTIST_HEADERS: (&str, &str) = (ARTIST_COLUMN, "artist_name");
const TRACK_HEADERS: (&str, &str) = (TRACK_COLUMN, "track_name");
const FILE_HEADERS: (&str, &str) = (FILE_COLUMN, "File Name");
const SCROBBLE_HEADERS: (&str, &str) = (SCROBBLES_COLUMN, "scrobbles");

// ============================================================================
// Row Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
struct TrackRow {
    #[serde(rename = "Artist Name(s)", alias = "artist_name")]
    artist: Option<String>,
    #[serde(rename = "Track Name", alias = "track_name")]
    track: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LibraryRow {
    #[serde(rename = "Artist Name(s)", alias = "artist_name")]
    artist: Option<String>,
    #[serde(rename = "Track Name", alias = "track_name")]
    track: Option<String>,
    #[serde(rename = "file_name", alias = "File Name")]
    file_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ScrobbleRow {
    #[serde(rename = "Artist Name(s)", alias = "artist_name")]
    artist: Option<String>,
    #[serde(rename = "Scrobbles", alias = "scrobbles")]
    scrobbles: Option<String>,
}

// ============================================================================
// Loaded Sources
// ============================================================================

/// File locations for every source table.
#[derive(Debug, Clone)]
pub struct SourcePaths {
    pub library: PathBuf,
    pub liked: PathBuf,
    pub top: PathBuf,
    pub scrobbles: PathBuf,
    /// Optional extra history export, only used as fuzzy-match references
    pub extra_history: Option<PathBuf>,
}

impl SourcePaths {
    /// All required source paths, for output safety checks
    pub fn all(&self) -> Vec<&Path> {
        let mut paths = vec![
            self.library.as_path(),
            self.liked.as_path(),
            self.top.as_path(),
            self.scrobbles.as_path(),
        ];
        if let Some(extra) = &self.extra_history {
            paths.push(extra.as_path());
        }
        paths
    }
}

/// Every record collection one run works on.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub library: Vec<LibraryEntry>,
    pub liked: Vec<HistoryRow>,
    pub top: Vec<HistoryRow>,
    pub scrobbles: Vec<ArtistPriority>,
    pub extra_history: Vec<TrackRecord>,
    pub scrobbles_dropped: usize,
    pub scrobbles_repaired: usize,
}

/// Parsed scrobble table plus row-level bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrobbleTable {
    pub rows: Vec<ArtistPriority>,
    pub dropped: usize,
    pub repaired: usize,
}

pub struct SourceLoader {
    paths: SourcePaths,
    repair: RepairMode,
}

impl SourceLoader {
    pub fn new(paths: SourcePaths, repair: RepairMode) -> Self {
        Self { paths, repair }
    }

    /// Load all sources. Fails on the first unreadable or malformed table.
    pub fn load(&self) -> Result<Sources> {
        let library = self.load_library()?;
        let liked = self.load_history(&self.paths.liked, Origin::Liked)?;
        let top = self.load_history(&self.paths.top, Origin::Top)?;
        let scrobbles = self.load_scrobbles()?;
        let extra_history = self.load_extra_history()?;

        info!(
            "Loaded {} library, {} liked, {} top, {} scrobble rows ({} dropped, {} repaired)",
            library.len(),
            liked.len(),
            top.len(),
            scrobbles.rows.len(),
            scrobbles.dropped,
            scrobbles.repaired
        );

        Ok(Sources {
            library,
            liked,
            top,
            scrobbles: scrobbles.rows,
            extra_history,
            scrobbles_dropped: scrobbles.dropped,
            scrobbles_repaired: scrobbles.repaired,
        })
    }

    /// Load only the listening history (liked, top and any extra export),
    /// for filename recovery where the library and scrobbles are not needed.
    pub fn load_history_sources(&self) -> Result<Sources> {
        Ok(Sources {
            liked: self.load_history(&self.paths.liked, Origin::Liked)?,
            top: self.load_history(&self.paths.top, Origin::Top)?,
            extra_history: self.load_extra_history()?,
            ..Default::default()
        })
    }

    pub fn load_extra_history(&self) -> Result<Vec<TrackRecord>> {
        match &self.paths.extra_history {
            Some(path) => load_tracks(path),
            None => Ok(Vec::new()),
        }
    }

    pub fn load_library(&self) -> Result<Vec<LibraryEntry>> {
        let content = read_table(&self.paths.library)?;
        parse_library(&content, &self.paths.library)
    }

    pub fn load_history(&self, path: &Path, origin: Origin) -> Result<Vec<HistoryRow>> {
        let tracks = load_tracks(path)?;
        Ok(tracks
            .into_iter()
            .map(|track| HistoryRow { track, origin })
            .collect())
    }

    pub fn load_scrobbles(&self) -> Result<ScrobbleTable> {
        let content = read_table(&self.paths.scrobbles)?;
        parse_scrobbles(&content, &self.paths.scrobbles, self.repair)
    }
}

// ============================================================================
// Parsing
// ============================================================================

/// Read a source file into text, accepting UTF-8 or Latin-1 bytes.
pub fn read_table(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read source table {}", path.display()))?;
    Ok(decode_source_bytes(&bytes))
}

fn load_tracks(path: &Path) -> Result<Vec<TrackRecord>> {
    let content = read_table(path)?;
    parse_tracks(&content, path)
}

fn reader_for(content: &str) -> csv::Reader<&[u8]> {
    csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes())
}

/// Fail unless every logical column is present under one of its spellings.
fn require_columns(
    reader: &mut csv::Reader<&[u8]>,
    source: &Path,
    columns: &[(&str, &str)],
) -> Result<()> {
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header row of {}", source.display()))?;
    for (canonical, alias) in columns {
        if !headers.iter().any(|h| h == *canonical || h == *alias) {
            bail!(
                "Source table {} is missing column '{}' (found: {:?})",
                source.display(),
                canonical,
                headers.iter().collect::<Vec<_>>()
            );
        }
    }
    Ok(())
}

/// Parse an `Artist Name(s), Track Name` table.
pub fn parse_tracks(content: &str, source: &Path) -> Result<Vec<TrackRecord>> {
    let mut reader = reader_for(content);
    require_columns(&mut reader, source, &[ARTIST_HEADERS, TRACK_HEADERS])?;

    let mut tracks = Vec::new();
    for (line, row) in reader.deserialize::<TrackRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, source.display()))?;
        if row.artist.is_none() && row.track.is_none() {
            debug!("Skipping empty row {} in {}", line + 2, source.display());
            continue;
        }
        tracks.push(TrackRecord::new(
            row.artist.unwrap_or_default(),
            row.track.unwrap_or_default(),
        ));
    }
    Ok(tracks)
}

/// Parse an `Artist Name(s), Track Name, file_name` library table.
pub fn parse_library(content: &str, source: &Path) -> Result<Vec<LibraryEntry>> {
    let mut reader = reader_for(content);
    require_columns(&mut reader, source, &[ARTIST_HEADERS, TRACK_HEADERS, FILE_HEADERS])?;

    let mut entries = Vec::new();
    for (line, row) in reader.deserialize::<LibraryRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, source.display()))?;
        if row.artist.is_none() && row.track.is_none() {
            debug!("Skipping empty row {} in {}", line + 2, source.display());
            continue;
        }
        entries.push(LibraryEntry {
            track: TrackRecord::new(row.artist.unwrap_or_default(), row.track.unwrap_or_default()),
            source_filename: row.file_name.unwrap_or_default(),
        });
    }
    Ok(entries)
}

/// Parse an `Artist Name(s), Scrobbles` table, repairing artist names.
pub fn parse_scrobbles(content: &str, source: &Path, repair: RepairMode) -> Result<ScrobbleTable> {
    let mut reader = reader_for(content);
    require_columns(&mut reader, source, &[ARTIST_HEADERS, SCROBBLE_HEADERS])?;

    let mut table = ScrobbleTable::default();
    for (line, row) in reader.deserialize::<ScrobbleRow>().enumerate() {
        let row = row.with_context(|| format!("Malformed row {} in {}", line + 2, source.display()))?;

        let count = match row.scrobbles.as_deref().and_then(parse_scrobble_count) {
            Some(count) => count,
            None => {
                debug!(
                    "Dropping scrobble row {} in {}: count {:?}",
                    line + 2,
                    source.display(),
                    row.scrobbles
                );
                table.dropped += 1;
                continue;
            }
        };
        let Some(raw_artist) = row.artist else {
            debug!("Dropping scrobble row {} in {}: no artist", line + 2, source.display());
            table.dropped += 1;
            continue;
        };

        let artist = apply_repair(&raw_artist, repair);
        if artist != raw_artist.as_str() {
            table.repaired += 1;
        }
        table.rows.push(ArtistPriority::new(artist.into_owned(), count));
    }
    Ok(table)
}

/// Parse a scrobble count. Accepts integers and whole-number floats ("12.0");
/// rejects negatives, fractions and anything non-numeric.
pub fn parse_scrobble_count(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return Some(n);
    }
    let f = raw.parse::<f64>().ok()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 {
        Some(f as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn src() -> PathBuf {
        PathBuf::from("test.csv")
    }

    #[test]
    fn test_parse_tracks_derives_keys() {
        let csv = "Artist Name(s),Track Name,Album\nThe Strokes,Reptilia,Room On Fire\nAC/DC,T.N.T.,\n";
        let tracks = parse_tracks(csv, &src()).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].key(), ("thestrokes", "reptilia"));
        assert_eq!(tracks[1].artist(), "AC/DC");
        assert_eq!(tracks[1].title_key(), "tnt");
    }

    #[test]
    fn test_parse_tracks_accepts_alias_headers() {
        let csv = "artist_name,track_name\nRadiohead,Lucky\n";
        let tracks = parse_tracks(csv, &src()).unwrap();
        assert_eq!(tracks[0].key(), ("radiohead", "lucky"));
    }

    #[test]
    fn test_parse_tracks_missing_column_is_fatal() {
        let csv = "Artist,Song\nRadiohead,Lucky\n";
        let err = parse_tracks(csv, &src()).unwrap_err();
        assert!(err.to_string().contains("missing column 'Artist Name(s)'"));
    }

    #[test]
    fn test_parse_tracks_absent_cell_gives_empty_key() {
        let csv = "Artist Name(s),Track Name\nRadiohead,\n";
        let tracks = parse_tracks(csv, &src()).unwrap();
        assert_eq!(tracks[0].title(), "");
        assert_eq!(tracks[0].title_key(), "");
    }

    #[test]
    fn test_parse_library() {
        let csv = "Artist Name(s),Track Name,file_name\nThe Strokes,Reptilia,The Strokes - Reptilia_p.psarc\n";
        let entries = parse_library(csv, &src()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_filename, "The Strokes - Reptilia_p.psarc");
        assert_eq!(entries[0].track.key(), ("thestrokes", "reptilia"));
    }

    #[test]
    fn test_parse_scrobbles_drops_bad_counts() {
        let csv = "Artist Name(s),Scrobbles\nMuse,1200\nQueen,n/a\nBlur,\nPulp,-3\nWeezer,42.0\n";
        let table = parse_scrobbles(csv, &src(), RepairMode::Detect).unwrap();
        let names: Vec<_> = table.rows.iter().map(|r| r.artist.as_str()).collect();
        assert_eq!(names, vec!["Muse", "Weezer"]);
        assert_eq!(table.rows[1].scrobble_count, 42);
        assert_eq!(table.dropped, 3);
    }

    #[test]
    fn test_parse_scrobbles_repairs_mojibake() {
        let csv = "Artist Name(s),Scrobbles\nBeyoncÃ©,10\nCafé Tacvba,5\n";
        let table = parse_scrobbles(csv, &src(), RepairMode::Detect).unwrap();
        assert_eq!(table.rows[0].artist, "Beyoncé");
        assert_eq!(table.rows[1].artist, "Café Tacvba");
        assert_eq!(table.repaired, 1);
    }

    #[test]
    fn test_parse_scrobble_count() {
        assert_eq!(parse_scrobble_count("500"), Some(500));
        assert_eq!(parse_scrobble_count(" 7 "), Some(7));
        assert_eq!(parse_scrobble_count("3.0"), Some(3));
        assert_eq!(parse_scrobble_count("3.5"), None);
        assert_eq!(parse_scrobble_count("1,234"), None);
        assert_eq!(parse_scrobble_count("NaN"), None);
    }

    #[test]
    fn test_load_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let loader = SourceLoader::new(
            SourcePaths {
                library: dir.path().join("cdlc_library.csv"),
                liked: dir.path().join("spotify_liked.csv"),
                top: dir.path().join("spotify_top.csv"),
                scrobbles: dir.path().join("lastfm_top_artists.csv"),
                extra_history: None,
            },
            RepairMode::Detect,
        );
        let err = loader.load().unwrap_err();
        assert!(format!("{:#}", err).contains("cdlc_library.csv"));
    }

    #[test]
    fn test_load_reads_latin1_scrobbles() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, bytes: &[u8]| {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(bytes).unwrap();
        };
        write("lib.csv", b"Artist Name(s),Track Name,file_name\n");
        write("liked.csv", b"Artist Name(s),Track Name\nBj\xC3\xB6rk,Joga\n");
        write("top.csv", b"Artist Name(s),Track Name\n");
        write("scrobbles.csv", b"Artist Name(s),Scrobbles\nBj\xF6rk,99\n");

        let loader = SourceLoader::new(
            SourcePaths {
                library: dir.path().join("lib.csv"),
                liked: dir.path().join("liked.csv"),
                top: dir.path().join("top.csv"),
                scrobbles: dir.path().join("scrobbles.csv"),
                extra_history: None,
            },
            RepairMode::Detect,
        );
        let sources = loader.load().unwrap();
        assert_eq!(sources.liked[0].track.artist(), "Björk");
        assert_eq!(sources.liked[0].origin, Origin::Liked);
        assert_eq!(sources.scrobbles[0].artist, "Björk");
        assert_eq!(sources.scrobbles[0].artist_key, sources.liked[0].track.artist_key());
    }
}
