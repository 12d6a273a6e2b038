//! Priority ranking of missing songs by artist scrobble count, plus the
//! optional existence filter.
//!
//! Ordering is descending by scrobble count with artists lacking a count at
//! the end; equal counts keep the order of the missing rows (stable sort).

use crossbeam_channel::{unbounded, Receiver, Sender};
use log::{debug, info};
use rustc_hash::FxHashMap;
use std::thread::{self, JoinHandle};

use crate::models::{ArtistPriority, HistoryRow, Recommendation};
use crate::oracle::ExistenceOracle;

// ============================================================================
// Options
// ============================================================================

/// Inclusive scrobble range applied to priority rows before the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrobbleRange {
    pub min: u64,
    pub max: Option<u64>,
}

impl ScrobbleRange {
    pub fn new(min: u64, max: Option<u64>) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, count: u64) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

/// Whether existence filtering runs on the truncated list or before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOrder {
    /// Take the top N, then keep only confirmed rows (may return fewer than N;
    /// at most N oracle calls).
    TruncateThenFilter,
    /// Walk the full ranking and keep confirmed rows until N are collected.
    FilterThenTruncate,
}

// ============================================================================
// Ranking
// ============================================================================

/// Scrobble count per artist key, restricted to `range`.
/// When an artist key appears more than once, the highest count wins.
pub fn priority_index(priorities: &[ArtistPriority], range: ScrobbleRange) -> FxHashMap<&str, u64> {
    let mut in_range: Vec<&ArtistPriority> = priorities
        .iter()
        .filter(|p| range.contains(p.scrobble_count))
        .collect();
    in_range.sort_by(|a, b| b.scrobble_count.cmp(&a.scrobble_count));

    let mut index = FxHashMap::default();
    for priority in in_range {
        index.entry(priority.artist_key.as_str()).or_insert(priority.scrobble_count);
    }
    index
}

/// Join missing rows with artist priority and sort. Every missing row is kept;
/// rows without an in-range priority carry `scrobble_count = None`.
pub fn rank(
    missing: &[HistoryRow],
    priorities: &[ArtistPriority],
    range: ScrobbleRange,
) -> Vec<Recommendation> {
    let index = priority_index(priorities, range);
    debug!("{} artists with in-range scrobble counts", index.len());

    let mut ranked: Vec<Recommendation> = missing
        .iter()
        .map(|row| Recommendation {
            artist: row.track.artist().to_string(),
            title: row.track.title().to_string(),
            artist_key: row.track.artist_key().to_string(),
            scrobble_count: index.get(row.track.artist_key()).copied(),
        })
        .collect();

    // Stable: ties keep missing-row order
    ranked.sort_by(|a, b| match (a.scrobble_count, b.scrobble_count) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    ranked
}

// ============================================================================
// Existence Filter
// ============================================================================

/// Progress of an existence-filter pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    /// About to query row `index` (1-based) of `total`
    Checking {
        index: usize,
        total: usize,
        artist: String,
        title: String,
    },
    /// Result for row `index`
    Checked { index: usize, exists: bool },
}

/// Keep ranked rows the oracle confirms, one query at a time.
///
/// `ranked` must already be sorted. The observer sees every event in order.
pub fn filter_existing<O, F>(
    ranked: Vec<Recommendation>,
    top_n: usize,
    order: FilterOrder,
    oracle: &mut O,
    mut observer: F,
) -> Vec<Recommendation>
where
    O: ExistenceOracle + ?Sized,
    F: FnMut(FilterEvent),
{
    let candidates: Vec<Recommendation> = match order {
        FilterOrder::TruncateThenFilter => ranked.into_iter().take(top_n).collect(),
        FilterOrder::FilterThenTruncate => ranked,
    };
    let total = candidates.len();

    let mut kept = Vec::new();
    for (i, row) in candidates.into_iter().enumerate() {
        if kept.len() >= top_n {
            break;
        }
        let index = i + 1;
        observer(FilterEvent::Checking {
            index,
            total,
            artist: row.artist.clone(),
            title: row.title.clone(),
        });
        let exists = oracle.exists(&row.artist, &row.title);
        observer(FilterEvent::Checked { index, exists });
        if exists {
            kept.push(row);
        }
    }

    info!("Existence filter kept {} of {} checked rows", kept.len(), total);
    kept
}

/// Run [`filter_existing`] on a worker thread, streaming progress events.
///
/// The receiver closes when the pass ends; join the handle for the result.
pub fn spawn_existence_filter<O>(
    ranked: Vec<Recommendation>,
    top_n: usize,
    order: FilterOrder,
    mut oracle: O,
) -> (Receiver<FilterEvent>, JoinHandle<Vec<Recommendation>>)
where
    O: ExistenceOracle + Send + 'static,
{
    let (tx, rx): (Sender<FilterEvent>, Receiver<FilterEvent>) = unbounded();
    let handle = thread::spawn(move || {
        filter_existing(ranked, top_n, order, &mut oracle, |event| {
            // A dropped receiver only means nobody is watching
            let _ = tx.send(event);
        })
    });
    (rx, handle)
}
