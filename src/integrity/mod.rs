//! Integrity facts for a product
//!
//! Read counts come from `<product>.bam_flagstats.json`, the content
//! token from `<product>.seqchksum`. Both files must exist exactly once
//! among the run's files.

mod seqchksum;

pub use seqchksum::{ChecksumRecord, MalformedRecord, Seqchksum, AGGREGATE};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use seqpub_catalog::{exact_name_pattern, match_exactly_one, DiscoveryError};

/// Suffix of the read-count summary file.
pub const FLAGSTATS_SUFFIX: &str = "bam_flagstats.json";

/// Suffix of the read-group checksum file.
pub const SEQCHKSUM_SUFFIX: &str = "seqchksum";

/// Facts feeding alignment metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityFacts {
    pub num_reads: u64,
    pub digest: String,
}

/// Errors deriving integrity facts.
#[derive(Debug, thiserror::Error)]
pub enum IntegrityError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0} is empty")]
    Empty(PathBuf),

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("{path} has no integer property {property}")]
    MissingProperty { path: PathBuf, property: String },

    #[error("{0} contains no read groups")]
    NoReadGroups(PathBuf),

    #[error("{0} has no all/all aggregate record")]
    NoAggregate(PathBuf),
}

/// Locates and parses per-product summary files.
#[derive(Debug, Clone)]
pub struct IntegrityResolver {
    files: Vec<PathBuf>,
    num_reads_property: String,
}

impl IntegrityResolver {
    pub fn new(files: Vec<PathBuf>, num_reads_property: impl Into<String>) -> Self {
        Self {
            files,
            num_reads_property: num_reads_property.into(),
        }
    }

    /// Total reads recorded for the product.
    pub fn num_reads(&self, product: &str) -> Result<u64, IntegrityError> {
        let path = self.locate(product, FLAGSTATS_SUFFIX)?;
        let text = read_non_empty(&path)?;

        let json: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| IntegrityError::Parse {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        let property = json
            .get(&self.num_reads_property)
            .ok_or_else(|| IntegrityError::MissingProperty {
                path: path.clone(),
                property: self.num_reads_property.clone(),
            })?;

        let num_reads = property.as_u64().ok_or_else(|| IntegrityError::Parse {
            path: path.clone(),
            reason: format!(
                "{} is not a non-negative integer: {}",
                self.num_reads_property, property
            ),
        })?;

        debug!(product, num_reads, path = %path.display(), "read count resolved");
        Ok(num_reads)
    }

    /// Content-equality token for the product's reads.
    pub fn digest(&self, product: &str) -> Result<String, IntegrityError> {
        let path = self.locate(product, SEQCHKSUM_SUFFIX)?;
        let text = read_non_empty(&path)?;

        let parsed = Seqchksum::parse(&text).map_err(|e| IntegrityError::Parse {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if parsed.read_groups().is_empty() {
            return Err(IntegrityError::NoReadGroups(path));
        }

        let token = parsed
            .token()
            .ok_or_else(|| IntegrityError::NoAggregate(path.clone()))?;

        debug!(product, read_groups = parsed.read_groups().len(), "digest resolved");
        Ok(token)
    }

    /// Both facts at once.
    pub fn resolve(&self, product: &str) -> Result<IntegrityFacts, IntegrityError> {
        Ok(IntegrityFacts {
            num_reads: self.num_reads(product)?,
            digest: self.digest(product)?,
        })
    }

    fn locate(&self, product: &str, suffix: &str) -> Result<PathBuf, IntegrityError> {
        let pattern = exact_name_pattern(product, suffix)?;
        Ok(match_exactly_one(&pattern, &self.files)?)
    }
}

fn read_non_empty(path: &Path) -> Result<String, IntegrityError> {
    let text = fs::read_to_string(path).map_err(|source| IntegrityError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if text.trim().is_empty() {
        return Err(IntegrityError::Empty(path.to_path_buf()));
    }
    Ok(text)
}
