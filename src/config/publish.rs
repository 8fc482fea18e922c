//! Typed publisher configuration

use seqpub_catalog::{AlignmentFormat, CatalogConfig, DEFAULT_RESTART_FILE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::defaults::{BuiltinDefaults, DEFAULT_COLLECTION_ROOT};
use super::effective::ConfigError;

/// Run-wide facts used for alignment tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunFacts {
    #[serde(default = "yes")]
    pub is_paired_read: bool,
    #[serde(default = "yes")]
    pub is_aligned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

fn yes() -> bool {
    true
}

impl Default for RunFacts {
    fn default() -> Self {
        Self {
            is_paired_read: true,
            is_aligned: true,
            reference: None,
        }
    }
}

/// Filename rules for classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub ancillary: Vec<String>,
    pub genotype: Vec<String>,
    pub qc_subdir: String,
    pub interop_dir: String,
}

impl FormatConfig {
    /// Classification rules for these formats.
    pub fn catalog_config(&self, file_format: AlignmentFormat) -> CatalogConfig {
        CatalogConfig {
            file_format,
            ancillary_suffixes: self.ancillary.clone(),
            genotype_suffixes: self.genotype.clone(),
            qc_subdir: self.qc_subdir.clone(),
            interop_dir: self.interop_dir.clone(),
        }
    }
}

impl Default for FormatConfig {
    fn default() -> Self {
        let defaults = BuiltinDefaults::default();
        Self {
            ancillary: defaults.ancillary,
            genotype: defaults.genotype,
            qc_subdir: defaults.qc_subdir,
            interop_dir: defaults.interop_dir,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrityConfig {
    pub num_reads_property: String,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            num_reads_property: BuiltinDefaults::default().num_reads_property,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_level_group: Option<String>,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            run_level_group: Some(BuiltinDefaults::default().run_level_group),
        }
    }
}

impl PermissionConfig {
    /// Group granted read on run-level files. An empty name switches the
    /// grant off.
    pub fn run_level_group(&self) -> Option<&str> {
        self.run_level_group.as_deref().filter(|group| !group.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_sheet: Option<PathBuf>,
}

/// Complete configuration of one publishing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    pub id_run: u64,

    pub source_directory: PathBuf,

    /// Base collection; `/seq/<id_run>` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest_collection: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt_process: Option<String>,

    #[serde(default)]
    pub file_format: AlignmentFormat,

    /// Checkpoint file; `<source_directory>/published.json` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_errors: Option<usize>,

    #[serde(default)]
    pub force: bool,

    #[serde(default)]
    pub with_spiked_control: bool,

    #[serde(default)]
    pub run: RunFacts,

    #[serde(default)]
    pub formats: FormatConfig,

    #[serde(default)]
    pub integrity: IntegrityConfig,

    #[serde(default)]
    pub permissions: PermissionConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub identity: IdentityConfig,
}

impl PublishConfig {
    /// Configuration with built-in defaults for everything but the run.
    pub fn new(id_run: u64, source_directory: impl Into<PathBuf>) -> Self {
        Self {
            id_run,
            source_directory: source_directory.into(),
            dest_collection: None,
            alt_process: None,
            file_format: AlignmentFormat::default(),
            restart_file: None,
            max_errors: None,
            force: false,
            with_spiked_control: false,
            run: RunFacts::default(),
            formats: FormatConfig::default(),
            integrity: IntegrityConfig::default(),
            permissions: PermissionConfig::default(),
            store: StoreConfig::default(),
            identity: IdentityConfig::default(),
        }
    }

    /// Build from a merged configuration value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ConfigError> {
        let config: PublishConfig = serde_json::from_value(value)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_run == 0 {
            return Err(ConfigError::ValidationError(
                "id_run must be positive".to_string(),
            ));
        }
        if self.source_directory.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(
                "source_directory must not be empty".to_string(),
            ));
        }
        if let Some(collection) = &self.dest_collection {
            if !collection.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "dest_collection must be absolute: {}",
                    collection
                )));
            }
        }
        if let Some(alt) = &self.alt_process {
            if alt.is_empty() || alt.contains('/') {
                return Err(ConfigError::ValidationError(format!(
                    "alt_process must be a single path segment: {:?}",
                    alt
                )));
            }
        }
        if self.formats.qc_subdir.is_empty() || self.formats.qc_subdir.contains('/') {
            return Err(ConfigError::ValidationError(
                "formats.qc_subdir must be a single path segment".to_string(),
            ));
        }
        if self.integrity.num_reads_property.is_empty() {
            return Err(ConfigError::ValidationError(
                "integrity.num_reads_property must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Base collection without any alt-process suffix.
    pub fn base_collection(&self) -> String {
        match &self.dest_collection {
            Some(collection) => collection.trim_end_matches('/').to_string(),
            None => format!("{}/{}", DEFAULT_COLLECTION_ROOT, self.id_run),
        }
    }

    /// Checkpoint file location.
    pub fn restart_path(&self) -> PathBuf {
        self.restart_file
            .clone()
            .unwrap_or_else(|| self.source_directory.join(DEFAULT_RESTART_FILE))
    }

    pub fn source_directory(&self) -> &Path {
        &self.source_directory
    }

    /// Classification rules derived from this configuration.
    pub fn catalog_config(&self) -> CatalogConfig {
        self.formats.catalog_config(self.file_format)
    }
}
