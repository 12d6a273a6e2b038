//! The reconciliation pipeline: history union, owned-song anti-join, priority
//! ranking and the optional existence filter, with per-phase statistics.
//!
//! Everything here is a pure function of the loaded sources plus the oracle
//! port, so the whole pipeline runs in tests without touching disk.

use anyhow::{anyhow, Result};
use crossbeam_channel::Receiver;
use log::info;

use crate::dedup::{find_missing, union_history};
use crate::fuzzy::ReferenceSet;
use crate::loader::Sources;
use crate::models::{ReconcileStats, Recommendation};
use crate::oracle::ExistenceOracle;
use crate::ranking::{priority_index, rank, spawn_existence_filter, FilterEvent, FilterOrder, ScrobbleRange};

/// Parameters of one recommendation run.
#[derive(Debug, Clone, Copy)]
pub struct RecommendRequest {
    pub top_n: usize,
    pub range: ScrobbleRange,
}

impl Default for RecommendRequest {
    fn default() -> Self {
        Self {
            top_n: 50,
            range: ScrobbleRange::default(),
        }
    }
}

/// Stats for the loading phase.
pub fn load_stats(sources: &Sources) -> ReconcileStats {
    ReconcileStats {
        library_rows: sources.library.len(),
        liked_rows: sources.liked.len(),
        top_rows: sources.top.len(),
        scrobble_rows: sources.scrobbles.len(),
        scrobble_rows_dropped: sources.scrobbles_dropped,
        scrobble_rows_repaired: sources.scrobbles_repaired,
        ..Default::default()
    }
}

/// Full (untruncated) ranking of songs in the history but not the library.
pub fn ranked_missing(sources: &Sources, range: ScrobbleRange, stats: &mut ReconcileStats) -> Vec<Recommendation> {
    let history = union_history(&[sources.liked.as_slice(), sources.top.as_slice()]);
    let missing = find_missing(&history, &sources.library);

    stats.history_unique = history.len();
    stats.missing = missing.len();
    stats.owned = history.len() - missing.len();
    info!(
        "{} unique history songs: {} owned ({:.1}%), {} missing",
        stats.history_unique,
        stats.owned,
        stats.owned_rate(),
        stats.missing
    );

    stats.priority_artists_in_range = priority_index(&sources.scrobbles, range).len();
    let ranked = rank(&missing, &sources.scrobbles, range);
    stats.ranked_with_count = ranked.iter().filter(|r| r.scrobble_count.is_some()).count();
    stats.ranked_without_count = ranked.len() - stats.ranked_with_count;
    ranked
}

/// Ranked missing songs truncated to `top_n`.
pub fn recommend(sources: &Sources, request: RecommendRequest) -> (Vec<Recommendation>, ReconcileStats) {
    let mut stats = load_stats(sources);
    let mut recommendations = ranked_missing(sources, request.range, &mut stats);
    recommendations.truncate(request.top_n);
    stats.recommendations = recommendations.len();
    (recommendations, stats)
}

/// Like [`recommend`], keeping only songs the oracle says already have a
/// chart. The oracle runs on a worker thread; `follow` consumes its progress
/// events (with the expected number of checks) and returns
/// (checked, confirmed).
pub fn recommend_existing<O, F>(
    sources: &Sources,
    request: RecommendRequest,
    order: FilterOrder,
    oracle: O,
    follow: F,
) -> Result<(Vec<Recommendation>, ReconcileStats)>
where
    O: ExistenceOracle + Send + 'static,
    F: FnOnce(Receiver<FilterEvent>, usize) -> (usize, usize),
{
    let mut stats = load_stats(sources);
    let ranked = ranked_missing(sources, request.range, &mut stats);
    let expected = match order {
        FilterOrder::TruncateThenFilter => ranked.len().min(request.top_n),
        FilterOrder::FilterThenTruncate => ranked.len(),
    };
    info!("Checking up to {} songs against the existence oracle", expected);

    let (events, worker) = spawn_existence_filter(ranked, request.top_n, order, oracle);
    let (checks, confirmed) = follow(events, expected);
    let recommendations = worker
        .join()
        .map_err(|_| anyhow!("Existence filter worker panicked"))?;

    stats.oracle_checks = checks;
    stats.oracle_confirmed = confirmed;
    stats.recommendations = recommendations.len();
    Ok((recommendations, stats))
}

/// Reference titles for filename recovery: liked, then top, then any extra
/// history, in that order.
pub fn reference_set(sources: &Sources) -> ReferenceSet {
    let mut references = ReferenceSet::new();
    for row in sources.liked.iter().chain(sources.top.iter()) {
        references.insert_track(&row.track);
    }
    for track in &sources.extra_history {
        references.insert_track(track);
    }
    info!("Loaded {} reference titles", references.len());
    references
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArtistPriority, HistoryRow, LibraryEntry, Origin, TrackRecord};

    fn strokes_sources() -> Sources {
        Sources {
            library: vec![LibraryEntry {
                track: TrackRecord::new("The Strokes", "Reptilia"),
                source_filename: "The Strokes - Reptilia_p.psarc".to_string(),
            }],
            liked: vec![
                HistoryRow {
                    track: TrackRecord::new("the strokes", "reptilia"),
                    origin: Origin::Liked,
                },
                HistoryRow {
                    track: TrackRecord::new("the strokes", "heart in a cage"),
                    origin: Origin::Liked,
                },
            ],
            top: Vec::new(),
            scrobbles: vec![ArtistPriority::new("the strokes", 500)],
            ..Default::default()
        }
    }

    #[test]
    fn test_end_to_end_missing_song() {
        let (recs, stats) = recommend(&strokes_sources(), RecommendRequest::default());
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].artist, "the strokes");
        assert_eq!(recs[0].title, "heart in a cage");
        assert_eq!(recs[0].scrobble_count, Some(500));
        assert!(recs.iter().all(|r| r.title.to_lowercase() != "reptilia"));

        assert_eq!(stats.history_unique, 2);
        assert_eq!(stats.owned, 1);
        assert_eq!(stats.missing, 1);
        assert_eq!(stats.ranked_with_count, 1);
        assert_eq!(stats.recommendations, 1);
    }

    #[test]
    fn test_top_rows_join_history() {
        let mut sources = strokes_sources();
        sources.top.push(HistoryRow {
            track: TrackRecord::new("Muse", "Uprising"),
            origin: Origin::Top,
        });
        sources.top.push(HistoryRow {
            track: TrackRecord::new("The Strokes", "Heart In A Cage"),
            origin: Origin::Top,
        });
        let (recs, stats) = recommend(&sources, RecommendRequest::default());
        assert_eq!(stats.history_unique, 3);
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[1].artist, "Muse");
        assert_eq!(recs[1].scrobble_count, None);
    }

    fn count_events(events: Receiver<FilterEvent>, _expected: usize) -> (usize, usize) {
        let (mut checked, mut confirmed) = (0, 0);
        for event in events {
            if let FilterEvent::Checked { exists, .. } = event {
                checked += 1;
                confirmed += usize::from(exists);
            }
        }
        (checked, confirmed)
    }

    #[test]
    fn test_recommend_existing_counts_oracle_calls() {
        let oracle = |_: &str, _: &str| false;
        let (recs, stats) = recommend_existing(
            &strokes_sources(),
            RecommendRequest::default(),
            FilterOrder::TruncateThenFilter,
            oracle,
            count_events,
        )
        .unwrap();
        assert!(recs.is_empty());
        assert_eq!(stats.oracle_checks, 1);
        assert_eq!(stats.oracle_confirmed, 0);
    }

    #[test]
    fn test_recommend_existing_keeps_confirmed() {
        let mut sources = strokes_sources();
        sources.top.push(HistoryRow {
            track: TrackRecord::new("Muse", "Uprising"),
            origin: Origin::Top,
        });
        let mut expected_seen = 0;
        let (recs, stats) = recommend_existing(
            &sources,
            RecommendRequest::default(),
            FilterOrder::FilterThenTruncate,
            |artist: &str, _: &str| artist == "Muse",
            |events, expected| {
                expected_seen = expected;
                count_events(events, expected)
            },
        )
        .unwrap();
        assert_eq!(expected_seen, 2);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].artist, "Muse");
        assert_eq!((stats.oracle_checks, stats.oracle_confirmed, stats.recommendations), (2, 1, 1));
    }

    #[test]
    fn test_reference_set_order() {
        let mut sources = strokes_sources();
        sources.extra_history.push(TrackRecord::new("Queen", "Bohemian Rhapsody (Remastered)"));
        let refs = reference_set(&sources);
        assert_eq!(
            refs.titles().collect::<Vec<_>>(),
            vec![
                "the strokes - reptilia",
                "the strokes - heart in a cage",
                "Queen - Bohemian Rhapsody"
            ]
        );
    }
}
