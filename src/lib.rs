//! CDLC library reconciliation: find songs from the listening history that
//! the chart library is missing, rank them by artist popularity, and repair
//! malformed chart filenames.

pub mod config;
pub mod dedup;
pub mod encoding;
pub mod engine;
pub mod filename;
pub mod fuzzy;
pub mod library;
pub mod loader;
pub mod models;
pub mod normalize;
pub mod oracle;
pub mod progress;
pub mod ranking;
pub mod renamer;
pub mod report;
pub mod safety;
