//! Progress display for the folder passes and the existence filter.
//!
//! `--log-only` hides the bars; periodic `info!` lines take their place so
//! long runs stay readable under `tail -f`.

use crossbeam_channel::Receiver;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::ranking::FilterEvent;

static LOG_ONLY: AtomicBool = AtomicBool::new(false);

pub fn set_log_only(value: bool) {
    LOG_ONLY.store(value, Ordering::Relaxed);
}

fn log_only() -> bool {
    LOG_ONLY.load(Ordering::Relaxed)
}

/// Elapsed time for summaries: `4.2s` under a minute, `3m 05s` above.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else {
        format!("{}m {:02}s", secs / 60, secs % 60)
    }
}

/// Bar over a known number of items, counted in `unit` ("files", "songs").
pub fn pass_bar(len: u64, msg: &str, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if log_only() {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    } else {
        let template = format!("{{msg:<32}} [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} (ETA: {{eta}})", unit);
        pb.set_style(ProgressStyle::default_bar().template(&template).unwrap().progress_chars("=> "));
    }
    pb.set_message(msg.to_string());
    pb
}

/// In log-only mode, an `info!` line every `interval` items and on the last.
pub fn log_progress(phase: &str, current: u64, total: u64, interval: u64) {
    if log_only() && total > 0 && (current % interval.max(1) == 0 || current == total) {
        let pct = 100.0 * current as f64 / total as f64;
        info!("[{}] {}/{} ({:.1}%)", phase, current, total, pct);
    }
}

/// Drive a bar from existence-filter events until the worker closes the
/// channel. Returns (checked, confirmed).
pub fn follow_filter_events(events: Receiver<FilterEvent>, expected: usize) -> (usize, usize) {
    let pb = pass_bar(expected as u64, "Checking existing charts", "songs");
    let (mut checked, mut confirmed) = (0, 0);

    for event in events {
        match event {
            FilterEvent::Checking {
                index,
                total,
                artist,
                title,
            } => {
                if total as u64 != pb.length().unwrap_or(0) {
                    pb.set_length(total as u64);
                }
                pb.set_message(format!("{} - {}", artist, title));
                log_progress("existence", index as u64, total as u64, 10);
            }
            FilterEvent::Checked { exists, .. } => {
                checked += 1;
                if exists {
                    confirmed += 1;
                }
                pb.inc(1);
            }
        }
    }

    pb.finish_and_clear();
    (checked, confirmed)
}
