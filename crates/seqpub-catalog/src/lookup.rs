//! Unique-file lookups and product name extraction.

use regex_lite::Regex;
use std::path::{Path, PathBuf};

/// Suffix identifying a composition descriptor.
pub const COMPOSITION_SUFFIX: &str = "composition.json";

/// Errors from file discovery and lookup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiscoveryError {
    #[error("no file matches {pattern}")]
    NoMatch { pattern: String },

    #[error("{count} files match {pattern}, expected exactly one: {candidates:?}")]
    Ambiguous {
        pattern: String,
        count: usize,
        candidates: Vec<PathBuf>,
    },

    #[error("not a composition file: {0}")]
    NotComposition(PathBuf),

    #[error("invalid lookup pattern {pattern}: {reason}")]
    Pattern { pattern: String, reason: String },

    #[error("failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },
}

/// Location of a product's composition descriptor, split into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductPath {
    /// Product name (filename stem preceding `.composition.json`).
    pub name: String,
    /// Directory holding the descriptor.
    pub directory: PathBuf,
    /// Descriptor suffix, always `composition.json`.
    pub suffix: String,
}

/// Split a composition descriptor path into product name, directory and suffix.
pub fn parse_product_name(path: &Path) -> Result<ProductPath, DiscoveryError> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DiscoveryError::NotComposition(path.to_path_buf()))?;

    let name = file_name
        .strip_suffix(COMPOSITION_SUFFIX)
        .and_then(|stem| stem.strip_suffix('.'))
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| DiscoveryError::NotComposition(path.to_path_buf()))?;

    Ok(ProductPath {
        name: name.to_string(),
        directory: path.parent().map(Path::to_path_buf).unwrap_or_default(),
        suffix: COMPOSITION_SUFFIX.to_string(),
    })
}

/// Return the single path whose file name matches `pattern`.
///
/// Zero or several matches are both errors; ambiguity is never resolved by
/// picking one.
pub fn match_exactly_one(pattern: &Regex, files: &[PathBuf]) -> Result<PathBuf, DiscoveryError> {
    let mut candidates: Vec<PathBuf> = files
        .iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| pattern.is_match(n))
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    match candidates.len() {
        0 => Err(DiscoveryError::NoMatch {
            pattern: pattern.as_str().to_string(),
        }),
        1 => Ok(candidates.remove(0)),
        count => Err(DiscoveryError::Ambiguous {
            pattern: pattern.as_str().to_string(),
            count,
            candidates,
        }),
    }
}

/// Pattern matching exactly `<name>.<suffix>`.
pub fn exact_name_pattern(name: &str, suffix: &str) -> Result<Regex, DiscoveryError> {
    let pattern = format!(
        "^{}\\.{}$",
        regex_lite::escape(name),
        regex_lite::escape(suffix)
    );
    Regex::new(&pattern).map_err(|e| DiscoveryError::Pattern {
        pattern,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn test_parse_product_name() {
        let parsed = parse_product_name(Path::new("/runs/1/plex1/12345_1#1.composition.json")).unwrap();
        assert_eq!(parsed.name, "12345_1#1");
        assert_eq!(parsed.directory, PathBuf::from("/runs/1/plex1"));
        assert_eq!(parsed.suffix, "composition.json");
    }

    #[test]
    fn test_parse_product_name_rejects_other_files() {
        assert!(parse_product_name(Path::new("/runs/sample1.cram")).is_err());
        assert!(parse_product_name(Path::new("/runs/.composition.json")).is_err());
        assert!(parse_product_name(Path::new("/runs/composition.json")).is_err());
    }

    #[test]
    fn test_match_exactly_one_single() {
        let files = paths(&["/r/sample1.cram", "/r/sample1.bam_flagstats.json", "/r/sample2.bam_flagstats.json"]);
        let pattern = exact_name_pattern("sample1", "bam_flagstats.json").unwrap();
        let found = match_exactly_one(&pattern, &files).unwrap();
        assert_eq!(found, PathBuf::from("/r/sample1.bam_flagstats.json"));
    }

    #[test]
    fn test_match_exactly_one_none() {
        let files = paths(&["/r/sample1.cram"]);
        let pattern = exact_name_pattern("sample1", "seqchksum").unwrap();
        let err = match_exactly_one(&pattern, &files).unwrap_err();
        assert!(matches!(err, DiscoveryError::NoMatch { .. }));
    }

    #[test]
    fn test_match_exactly_one_ambiguous() {
        let files = paths(&["/r/a/sample1.seqchksum", "/r/b/sample1.seqchksum"]);
        let pattern = exact_name_pattern("sample1", "seqchksum").unwrap();
        match match_exactly_one(&pattern, &files).unwrap_err() {
            DiscoveryError::Ambiguous { count, candidates, .. } => {
                assert_eq!(count, 2);
                assert_eq!(candidates.len(), 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_exact_name_pattern_escapes_metacharacters() {
        let pattern = exact_name_pattern("12345_1#1", "seqchksum").unwrap();
        assert!(pattern.is_match("12345_1#1.seqchksum"));
        assert!(!pattern.is_match("12345_1#10.seqchksum"));
        assert!(!pattern.is_match("12345_1#1xseqchksum"));
    }
}
