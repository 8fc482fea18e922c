//! Catalog configuration types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default ancillary filename suffixes.
pub const DEFAULT_ANCILLARY_SUFFIXES: &[&str] = &[
    "bamcheck",
    "bed",
    "flagstat",
    "quality",
    "sha512primesums512.seqchksum",
    "stats",
    "txt",
];

/// Default genotype filename suffixes.
pub const DEFAULT_GENOTYPE_SUFFIXES: &[&str] = &["bcf", "vcf", "geno"];

/// Default qc sub-path.
pub const DEFAULT_QC_SUBDIR: &str = "qc";

/// Default instrument metrics directory.
pub const DEFAULT_INTEROP_DIR: &str = "InterOp";

/// Alignment file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentFormat {
    #[default]
    Cram,
    Bam,
}

impl AlignmentFormat {
    /// Extension of alignment files in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            AlignmentFormat::Cram => "cram",
            AlignmentFormat::Bam => "bam",
        }
    }

    /// Extension of the index files paired with this format.
    pub fn index_extension(&self) -> &'static str {
        match self {
            AlignmentFormat::Cram => "crai",
            AlignmentFormat::Bam => "bai",
        }
    }

    /// Parse from a case-insensitive name.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cram" => Some(AlignmentFormat::Cram),
            "bam" => Some(AlignmentFormat::Bam),
            _ => None,
        }
    }
}

impl fmt::Display for AlignmentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Classification rules for a run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Alignment format; also selects the index extension.
    #[serde(default)]
    pub file_format: AlignmentFormat,

    /// Ancillary filename suffixes (without the leading dot).
    #[serde(default = "default_ancillary")]
    pub ancillary_suffixes: Vec<String>,

    /// Genotype filename suffixes (without the leading dot).
    #[serde(default = "default_genotype")]
    pub genotype_suffixes: Vec<String>,

    /// Path component holding qc JSON files.
    #[serde(default = "default_qc_subdir")]
    pub qc_subdir: String,

    /// Path component holding instrument binary metrics.
    #[serde(default = "default_interop_dir")]
    pub interop_dir: String,
}

fn default_ancillary() -> Vec<String> {
    DEFAULT_ANCILLARY_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_genotype() -> Vec<String> {
    DEFAULT_GENOTYPE_SUFFIXES.iter().map(|s| s.to_string()).collect()
}

fn default_qc_subdir() -> String {
    DEFAULT_QC_SUBDIR.to_string()
}

fn default_interop_dir() -> String {
    DEFAULT_INTEROP_DIR.to_string()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            file_format: AlignmentFormat::default(),
            ancillary_suffixes: default_ancillary(),
            genotype_suffixes: default_genotype(),
            qc_subdir: default_qc_subdir(),
            interop_dir: default_interop_dir(),
        }
    }
}
