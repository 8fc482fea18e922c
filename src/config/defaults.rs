//! Built-in publisher defaults (layer 1)

use seqpub_catalog::{
    AlignmentFormat, DEFAULT_ANCILLARY_SUFFIXES, DEFAULT_GENOTYPE_SUFFIXES, DEFAULT_INTEROP_DIR,
    DEFAULT_QC_SUBDIR,
};
use serde::{Deserialize, Serialize};

/// Default read-count property in `<product>.bam_flagstats.json`.
pub const DEFAULT_NUM_READS_PROPERTY: &str = "num_total_reads";

/// Default group granted read access on run-level files.
pub const DEFAULT_RUN_LEVEL_GROUP: &str = "public";

/// Default root under which run collections are created.
pub const DEFAULT_COLLECTION_ROOT: &str = "/seq";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Alignment format (default: cram)
    pub file_format: AlignmentFormat,

    /// Republish unchanged content (default: false)
    pub force: bool,

    /// Include spiked-control identity facts (default: false)
    pub with_spiked_control: bool,

    /// Paired-read flag for alignment tags (default: true)
    pub is_paired_read: bool,

    /// Aligned flag for alignment tags (default: true)
    pub is_aligned: bool,

    /// Ancillary filename suffixes
    pub ancillary: Vec<String>,

    /// Genotype filename suffixes
    pub genotype: Vec<String>,

    /// qc sub-path (default: "qc")
    pub qc_subdir: String,

    /// InterOp directory (default: "InterOp")
    pub interop_dir: String,

    /// Read-count property (default: "num_total_reads")
    pub num_reads_property: String,

    /// Run-level read group (default: "public")
    pub run_level_group: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            file_format: AlignmentFormat::Cram,
            force: false,
            with_spiked_control: false,
            is_paired_read: true,
            is_aligned: true,
            ancillary: DEFAULT_ANCILLARY_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            genotype: DEFAULT_GENOTYPE_SUFFIXES.iter().map(|s| s.to_string()).collect(),
            qc_subdir: DEFAULT_QC_SUBDIR.to_string(),
            interop_dir: DEFAULT_INTEROP_DIR.to_string(),
            num_reads_property: DEFAULT_NUM_READS_PROPERTY.to_string(),
            run_level_group: DEFAULT_RUN_LEVEL_GROUP.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "file_format": self.file_format,
            "force": self.force,
            "with_spiked_control": self.with_spiked_control,
            "run": {
                "is_paired_read": self.is_paired_read,
                "is_aligned": self.is_aligned
            },
            "formats": {
                "ancillary": self.ancillary,
                "genotype": self.genotype,
                "qc_subdir": self.qc_subdir,
                "interop_dir": self.interop_dir
            },
            "integrity": {
                "num_reads_property": self.num_reads_property
            },
            "permissions": {
                "run_level_group": self.run_level_group
            }
        })
    }
}
