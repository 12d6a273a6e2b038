//! Guards against overwriting an input table with a generated report.

use anyhow::{bail, Result};
use std::path::Path;

/// Listening-history exports that are never valid output targets.
const PROTECTED_NAMES: [&str; 3] = ["spotify_liked", "spotify_top", "lastfm_"];

/// Validates that an output path is safe to overwrite.
///
/// - The output filename must contain `required_pattern`
///   ("recommendations", "rename_log", "library").
/// - The output cannot be any of `protected` (compared after resolving
///   both sides when they exist).
/// - The output cannot look like a listening-history export.
pub fn validate_output_path(output: &Path, required_pattern: &str, protected: &[&Path]) -> Result<()> {
    let output_name = output.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if !output_name.contains(required_pattern) {
        bail!(
            "Safety check failed: output file '{}' must contain '{}' in the name",
            output.display(),
            required_pattern
        );
    }

    let resolved_output = output.canonicalize().ok();
    for source in protected {
        let same = output == *source
            || match (&resolved_output, source.canonicalize().ok()) {
                (Some(a), Some(b)) => *a == b,
                _ => false,
            };
        if same {
            bail!(
                "Safety check failed: output '{}' cannot be the same as source '{}'",
                output.display(),
                source.display()
            );
        }
    }

    let lowered = output_name.to_lowercase();
    for pattern in PROTECTED_NAMES {
        if lowered.starts_with(pattern) {
            bail!(
                "Safety check failed: output '{}' looks like a listening-history export ('{}')",
                output.display(),
                pattern
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_valid_recommendations_output() {
        let output = PathBuf::from("/data/recommendations/recommendations.csv");
        let source = PathBuf::from("/data/spotify_liked.csv");
        assert!(validate_output_path(&output, "recommendations", &[&source]).is_ok());
    }

    #[test]
    fn test_missing_pattern() {
        let output = PathBuf::from("/data/out.csv");
        let result = validate_output_path(&output, "recommendations", &[]);
        assert!(result.unwrap_err().to_string().contains("must contain 'recommendations'"));
    }

    #[test]
    fn test_same_as_source() {
        let path = PathBuf::from("/data/cdlc_library.csv");
        let result = validate_output_path(&path, "library", &[&path]);
        assert!(result.unwrap_err().to_string().contains("cannot be the same as source"));
    }

    #[test]
    fn test_same_file_through_different_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("top_rename_log.csv");
        std::fs::write(&source, "x").unwrap();
        let output = dir.path().join(".").join("top_rename_log.csv");
        assert!(validate_output_path(&output, "rename_log", &[&source]).is_err());
    }

    #[test]
    fn test_history_export_name_rejected() {
        let output = PathBuf::from("/data/spotify_liked_recommendations.csv");
        assert!(validate_output_path(&output, "recommendations", &[]).is_err());
    }
}
