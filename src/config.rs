//! Run configuration loaded from TOML.
//!
//! Every field has a default, so an empty (or absent) file is a valid
//! configuration. Relative source and output paths resolve against
//! `data_dir`; the normalizer workspace resolves against `dlc_dir`.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::encoding::RepairMode;
use crate::fuzzy::MATCH_THRESHOLD;
use crate::loader::SourcePaths;
use crate::oracle::OracleSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Folder holding the source tables and generated reports
    pub data_dir: PathBuf,
    /// Chart folder scanned by the library rebuild
    pub dlc_dir: PathBuf,
    /// Normalizer workspace inside `dlc_dir`, excluded from the library scan
    pub normalizer_dir: PathBuf,
    pub repair_encoding: RepairMode,
    pub match_threshold: u8,
    pub sources: SourcesConfig,
    pub output: OutputConfig,
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub library: PathBuf,
    pub liked: PathBuf,
    pub top: PathBuf,
    pub scrobbles: PathBuf,
    /// Extra listening history used only as fuzzy-match references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra_history: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub recommendations: PathBuf,
    /// Folder of malformed chart files, inside the normalizer workspace
    pub unmatched_dir: PathBuf,
    /// Rename log, inside `unmatched_dir` unless absolute
    pub rename_log: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub endpoint: String,
    pub delay_ms: u64,
    pub max_retries: u32,
    pub timeout_secs: u64,
    pub page_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            dlc_dir: PathBuf::from("dlc"),
            normalizer_dir: PathBuf::from("01_CDLC Normalizer"),
            repair_encoding: RepairMode::default(),
            match_threshold: MATCH_THRESHOLD,
            sources: SourcesConfig::default(),
            output: OutputConfig::default(),
            oracle: OracleConfig::default(),
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            library: PathBuf::from("cdlc_library.csv"),
            liked: PathBuf::from("spotify_liked.csv"),
            top: PathBuf::from("spotify_top.csv"),
            scrobbles: PathBuf::from("lastfm_top_artists.csv"),
            extra_history: None,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            recommendations: PathBuf::from("recommendations/recommendations.csv"),
            unmatched_dir: PathBuf::from("unmatched"),
            rename_log: PathBuf::from("rename_log.csv"),
        }
    }
}

impl Default for OracleConfig {
    fn default() -> Self {
        let settings = OracleSettings::default();
        Self {
            endpoint: settings.endpoint,
            delay_ms: settings.delay.as_millis() as u64,
            max_retries: settings.max_retries,
            timeout_secs: settings.timeout.as_secs(),
            page_size: settings.page_size,
        }
    }
}

impl Config {
    /// Load from `path`, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                Self::from_toml(&content).with_context(|| format!("Invalid config {}", path.display()))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        ensure!(
            config.match_threshold <= 100,
            "match_threshold must be between 0 and 100, got {}",
            config.match_threshold
        );
        Ok(config)
    }

    fn in_data_dir(&self, path: &Path) -> PathBuf {
        self.data_dir.join(path)
    }

    pub fn source_paths(&self) -> SourcePaths {
        SourcePaths {
            library: self.library_path(),
            liked: self.in_data_dir(&self.sources.liked),
            top: self.in_data_dir(&self.sources.top),
            scrobbles: self.in_data_dir(&self.sources.scrobbles),
            extra_history: self.sources.extra_history.as_deref().map(|p| self.in_data_dir(p)),
        }
    }

    /// Library table; read by `recommend`, written by `rebuild-library`
    pub fn library_path(&self) -> PathBuf {
        self.in_data_dir(&self.sources.library)
    }

    pub fn recommendations_path(&self) -> PathBuf {
        self.in_data_dir(&self.output.recommendations)
    }

    pub fn normalizer_path(&self) -> PathBuf {
        self.dlc_dir.join(&self.normalizer_dir)
    }

    pub fn unmatched_dir(&self) -> PathBuf {
        self.normalizer_path().join(&self.output.unmatched_dir)
    }

    pub fn rename_log_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.output.rename_log)
    }

    pub fn oracle_settings(&self) -> OracleSettings {
        OracleSettings {
            endpoint: self.oracle.endpoint.clone(),
            delay: Duration::from_millis(self.oracle.delay_ms),
            max_retries: self.oracle.max_retries,
            timeout: Duration::from_secs(self.oracle.timeout_secs),
            page_size: self.oracle.page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.match_threshold, 80);
        assert_eq!(config.repair_encoding, RepairMode::Detect);
        assert_eq!(config.source_paths().liked, PathBuf::from("data/spotify_liked.csv"));
        assert_eq!(config.oracle_settings().delay, Duration::from_secs(1));
        assert!(config.source_paths().extra_history.is_none());
    }

    #[test]
    fn test_partial_config_overrides() {
        let config = Config::from_toml(
            r#"
            data_dir = "/music/data"
            dlc_dir = "/games/dlc"
            repair_encoding = "off"

            [sources]
            extra_history = "lastfm_history.csv"

            [oracle]
            delay_ms = 2500
            "#,
        )
        .unwrap();
        let paths = config.source_paths();
        assert_eq!(paths.library, PathBuf::from("/music/data/cdlc_library.csv"));
        assert_eq!(paths.extra_history, Some(PathBuf::from("/music/data/lastfm_history.csv")));
        assert_eq!(config.repair_encoding, RepairMode::Off);
        assert_eq!(config.oracle_settings().delay, Duration::from_millis(2500));
        assert_eq!(config.oracle_settings().max_retries, 3);
        assert_eq!(
            config.unmatched_dir(),
            PathBuf::from("/games/dlc/01_CDLC Normalizer/unmatched")
        );
    }

    #[test]
    fn test_unknown_repair_mode_is_error() {
        assert!(Config::from_toml("repair_encoding = \"sometimes\"").is_err());
    }

    #[test]
    fn test_threshold_above_100_rejected() {
        let err = Config::from_toml("match_threshold = 120").unwrap_err();
        assert!(err.to_string().contains("between 0 and 100"));
        assert_eq!(Config::from_toml("match_threshold = 100").unwrap().match_threshold, 100);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cdlc.toml");
        std::fs::write(&path, "match_threshold = 85\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.match_threshold, 85);
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
